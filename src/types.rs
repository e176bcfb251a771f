use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Opaque cluster identifier, allocated in increasing order starting at 1
pub type ClusterId = u64;

/// A WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject NaN, infinities and anything outside [-90,90] x [-180,180]
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(Error::invalid_location(format!(
                "non-finite coordinate ({}, {})", self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::invalid_location(format!(
                "latitude {} outside [-90, 90]", self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::invalid_location(format!(
                "longitude {} outside [-180, 180]", self.longitude
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// One entry of a radio scan, as handed over by the polling collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkObservation {
    #[serde(default)]
    pub ssid: String,
    pub bssid: String,
    #[serde(alias = "level")]
    pub signal_dbm: i32,
    #[serde(alias = "frequency")]
    pub frequency_mhz: i32,
    #[serde(default)]
    pub capabilities: String,
}

impl NetworkObservation {
    pub fn new(
        ssid: impl Into<String>,
        bssid: impl Into<String>,
        signal_dbm: i32,
        frequency_mhz: i32,
        capabilities: impl Into<String>,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
            signal_dbm,
            frequency_mhz,
            capabilities: capabilities.into(),
        }
    }
}

/// Access-control category derived from a capability string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    Open,
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "WPA")]
    Wpa,
    #[serde(rename = "WPA2")]
    Wpa2,
}

impl SecurityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityType::Open => "Open",
            SecurityType::Wep => "WEP",
            SecurityType::Wpa => "WPA",
            SecurityType::Wpa2 => "WPA2",
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known state of one BSSID inside one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub bssid: String,
    pub ssid: String,
    pub signal_dbm: i32,
    pub frequency_mhz: i32,
    pub security: SecurityType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Location-anchored aggregate of network records
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    anchor: Coordinate,
    pub(crate) networks: BTreeMap<String, NetworkRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    pub fn new(anchor: Coordinate, now: DateTime<Utc>) -> Self {
        Self {
            anchor,
            networks: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn from_parts(
        anchor: Coordinate,
        networks: BTreeMap<String, NetworkRecord>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self { anchor, networks, created_at, updated_at }
    }

    /// The position of the sample that created this cluster
    pub fn anchor(&self) -> Coordinate {
        self.anchor
    }

    pub fn network(&self, bssid: &str) -> Option<&NetworkRecord> {
        self.networks.get(bssid)
    }

    /// Records in ascending BSSID order
    pub fn networks(&self) -> impl Iterator<Item = &NetworkRecord> {
        self.networks.values()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
