//! Folds scan observations into a cluster's network records.

use chrono::{DateTime, Utc};
use log::trace;

use crate::types::{Cluster, NetworkObservation, NetworkRecord, SecurityType};

/// Classify a capability string. Tokens are tested WEP, WPA2, WPA in that order and the
/// first hit wins, so "[WEP][WPA2-PSK]" is WEP.
pub fn classify_security(capabilities: &str) -> SecurityType {
    if capabilities.contains("WEP") {
        SecurityType::Wep
    } else if capabilities.contains("WPA2") {
        SecurityType::Wpa2
    } else if capabilities.contains("WPA") {
        SecurityType::Wpa
    } else {
        SecurityType::Open
    }
}

/// Dedup key for a hardware identifier
pub fn normalize_bssid(bssid: &str) -> String {
    bssid.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting of this BSSID in the cluster
    Inserted,
    /// Known BSSID, at least one attribute changed
    Updated,
    /// Known BSSID reporting the same attributes; only last_seen moved
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub updated: usize,
    pub duplicates: usize,
}

impl MergeStats {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Duplicate => self.duplicates += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.duplicates
    }
}

/// Merge one observation. The latest observation overwrites name, signal, frequency and
/// security; first_seen is kept from the original sighting. Records are never removed.
pub fn merge_observation(
    cluster: &mut Cluster,
    observation: &NetworkObservation,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let bssid = normalize_bssid(&observation.bssid);
    let security = classify_security(&observation.capabilities);

    match cluster.networks.get_mut(&bssid) {
        Some(record) => {
            let unchanged = record.ssid == observation.ssid
                && record.signal_dbm == observation.signal_dbm
                && record.frequency_mhz == observation.frequency_mhz
                && record.security == security;

            record.ssid.clone_from(&observation.ssid);
            record.signal_dbm = observation.signal_dbm;
            record.frequency_mhz = observation.frequency_mhz;
            record.security = security;
            record.last_seen = now;

            if unchanged {
                MergeOutcome::Duplicate
            } else {
                MergeOutcome::Updated
            }
        }
        None => {
            trace!("New network {} ({:?}) in cluster anchored at {}", bssid, observation.ssid, cluster.anchor());
            cluster.networks.insert(
                bssid.clone(),
                NetworkRecord {
                    bssid,
                    ssid: observation.ssid.clone(),
                    signal_dbm: observation.signal_dbm,
                    frequency_mhz: observation.frequency_mhz,
                    security,
                    first_seen: now,
                    last_seen: now,
                },
            );
            MergeOutcome::Inserted
        }
    }
}

/// Merge a whole scan into the cluster in order
pub fn merge_all(
    cluster: &mut Cluster,
    observations: &[NetworkObservation],
    now: DateTime<Utc>,
) -> MergeStats {
    let mut stats = MergeStats::default();
    for observation in observations {
        stats.record(merge_observation(cluster, observation, now));
    }
    stats
}
