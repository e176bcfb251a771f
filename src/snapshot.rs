//! Text forms of the cluster set: the JSON snapshot shared by export and persistence,
//! and a flat CSV listing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::merger::normalize_bssid;
use crate::types::{Cluster, ClusterId, Coordinate, NetworkRecord};

pub const CSV_HEADER: [&str; 10] = [
    "cluster_id", "latitude", "longitude", "bssid", "ssid",
    "signal_dbm", "frequency_mhz", "security", "first_seen", "last_seen",
];

#[derive(Serialize)]
struct ClusterView<'a> {
    id: ClusterId,
    latitude: f64,
    longitude: f64,
    created_at: &'a DateTime<Utc>,
    updated_at: &'a DateTime<Utc>,
    networks: Vec<&'a NetworkRecord>,
}

/// Owned form of one exported cluster
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub networks: Vec<NetworkRecord>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    cluster_id: ClusterId,
    latitude: f64,
    longitude: f64,
    bssid: &'a str,
    ssid: &'a str,
    signal_dbm: i32,
    frequency_mhz: i32,
    security: &'static str,
    first_seen: String,
    last_seen: String,
}

/// Pretty JSON array of clusters, ascending by id then by BSSID. Same state, same bytes.
pub fn encode(clusters: &BTreeMap<ClusterId, Cluster>) -> Result<String> {
    let views: Vec<ClusterView<'_>> = clusters
        .iter()
        .map(|(id, cluster)| {
            let anchor = cluster.anchor();
            ClusterView {
                id: *id,
                latitude: anchor.latitude,
                longitude: anchor.longitude,
                created_at: &cluster.created_at,
                updated_at: &cluster.updated_at,
                networks: cluster.networks().collect(),
            }
        })
        .collect();
    Ok(serde_json::to_string_pretty(&views)?)
}

/// Parse and validate a snapshot. Anything that would break a store invariant is reported
/// as `CorruptPersistedState`.
pub fn decode(text: &str) -> Result<BTreeMap<ClusterId, Cluster>> {
    let snapshots: Vec<ClusterSnapshot> = serde_json::from_str(text)
        .map_err(|e| Error::corrupt(format!("unparseable snapshot: {}", e)))?;

    let mut clusters = BTreeMap::new();
    for snapshot in snapshots {
        let id = snapshot.id;
        if id == 0 {
            return Err(Error::corrupt("cluster id 0 is reserved"));
        }
        let anchor = Coordinate::new(snapshot.latitude, snapshot.longitude);
        anchor
            .validate()
            .map_err(|e| Error::corrupt(format!("cluster {}: {}", id, e)))?;
        if snapshot.networks.is_empty() {
            return Err(Error::corrupt(format!("cluster {} has no networks", id)));
        }

        let mut networks = BTreeMap::new();
        for record in snapshot.networks {
            if record.bssid != normalize_bssid(&record.bssid) {
                return Err(Error::corrupt(format!(
                    "cluster {}: bssid {:?} is not normalized", id, record.bssid
                )));
            }
            let bssid = record.bssid.clone();
            if networks.insert(bssid.clone(), record).is_some() {
                return Err(Error::corrupt(format!("cluster {}: duplicate bssid {}", id, bssid)));
            }
        }

        let cluster = Cluster::from_parts(anchor, networks, snapshot.created_at, snapshot.updated_at);
        if clusters.insert(id, cluster).is_some() {
            return Err(Error::corrupt(format!("duplicate cluster id {}", id)));
        }
    }
    Ok(clusters)
}

/// Distinct BSSIDs across all clusters, ignoring which cluster saw them
pub fn unique_bssids(clusters: &BTreeMap<ClusterId, Cluster>) -> BTreeSet<&str> {
    clusters
        .values()
        .flat_map(|c| c.networks().map(|r| r.bssid.as_str()))
        .collect()
}

/// One CSV row per network record, same ordering as the JSON snapshot
pub fn encode_csv(clusters: &BTreeMap<ClusterId, Cluster>) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for (id, cluster) in clusters {
        let anchor = cluster.anchor();
        for record in cluster.networks() {
            writer.serialize(CsvRow {
                cluster_id: *id,
                latitude: anchor.latitude,
                longitude: anchor.longitude,
                bssid: &record.bssid,
                ssid: &record.ssid,
                signal_dbm: record.signal_dbm,
                frequency_mhz: record.frequency_mhz,
                security: record.security.as_str(),
                first_seen: record.first_seen.to_rfc3339(),
                last_seen: record.last_seen.to_rfc3339(),
            })?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Serialization(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::merge_observation;
    use crate::types::NetworkObservation;
    use chrono::TimeZone;

    fn sample() -> BTreeMap<ClusterId, Cluster> {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut a = Cluster::new(Coordinate::new(40.0, -75.0), t);
        merge_observation(&mut a, &NetworkObservation::new("Home", "AA:BB", -50, 2412, "[WPA2-PSK]"), t);
        merge_observation(&mut a, &NetworkObservation::new("", "00:11", -80, 2437, "[ESS]"), t);
        let mut b = Cluster::new(Coordinate::new(41.0, -76.0), t);
        merge_observation(&mut b, &NetworkObservation::new("Cafe, \"Free\"", "cc:dd", -67, 5180, "[WEP]"), t);

        let mut clusters = BTreeMap::new();
        clusters.insert(2, b);
        clusters.insert(1, a);
        clusters
    }

    #[test]
    fn encode_orders_clusters_and_networks() {
        let text = encode(&sample()).unwrap();
        let first = text.find("\"id\": 1").unwrap();
        let second = text.find("\"id\": 2").unwrap();
        assert!(first < second);
        assert!(text.find("00:11").unwrap() < text.find("aa:bb").unwrap());
        assert!(text.contains("\"security\": \"WPA2\""));
        assert!(text.trim_start().starts_with('['));
    }

    #[test]
    fn decode_reverses_encode() {
        let clusters = sample();
        let text = encode(&clusters).unwrap();
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded, clusters);
        assert_eq!(encode(&decoded).unwrap(), text);
    }

    #[test]
    fn empty_set_encodes_as_empty_array() {
        let text = encode(&BTreeMap::new()).unwrap();
        assert_eq!(text, "[]");
        assert!(decode(&text).unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_garbage_and_broken_invariants() {
        let t = "2024-05-01T12:00:00Z";
        let record = |bssid: &str| format!(
            r#"{{"bssid":"{}","ssid":"x","signal_dbm":-1,"frequency_mhz":1,"security":"Open","first_seen":"{t}","last_seen":"{t}"}}"#,
            bssid
        );
        let cluster = |id: u64, lat: f64, nets: &str| format!(
            r#"{{"id":{},"latitude":{},"longitude":0.0,"created_at":"{t}","updated_at":"{t}","networks":[{}]}}"#,
            id, lat, nets
        );

        let cases = vec![
            "not json".to_string(),
            "{}".to_string(),
            format!("[{}]", cluster(1, 0.0, "")),
            format!("[{}]", cluster(1, 95.0, &record("aa"))),
            format!("[{}]", cluster(0, 0.0, &record("aa"))),
            format!("[{}]", cluster(1, 0.0, &format!("{},{}", record("aa"), record("aa")))),
            format!("[{}]", cluster(1, 0.0, &record("AA"))),
            format!("[{},{}]", cluster(1, 0.0, &record("aa")), cluster(1, 1.0, &record("bb"))),
        ];
        for case in cases {
            assert!(matches!(decode(&case), Err(Error::CorruptPersistedState(_))), "{}", case);
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let text = encode_csv(&sample()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].contains(",00:11,"));
        assert!(lines[3].contains("\"Cafe, \"\"Free\"\"\""));
        assert!(lines[3].contains(",WEP,"));
    }

    #[test]
    fn csv_of_empty_set_is_header_only() {
        let text = encode_csv(&BTreeMap::new()).unwrap();
        assert_eq!(text.trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn unique_bssids_spans_clusters() {
        let mut clusters = sample();
        let t = Utc::now();
        if let Some(c) = clusters.get_mut(&2) {
            merge_observation(c, &NetworkObservation::new("Home", "aa:bb", -90, 2412, ""), t);
        }
        assert_eq!(unique_bssids(&clusters).len(), 3);
    }
}
