//! wifimap groups Wi-Fi scan results into location-anchored clusters.
//! Each sample (position plus the networks heard there) is folded into the nearest
//! cluster within a proximity radius, networks are deduplicated per cluster by BSSID,
//! and the whole set is exported and persisted as a deterministic JSON snapshot.

// Module declarations
pub mod error;
pub mod types;
pub mod config;
pub mod matcher;
pub mod merger;
pub mod snapshot;
pub mod storage;
pub mod store;

// Re-exports
pub use error::{Error, Result};
pub use types::{Cluster, ClusterId, Coordinate, NetworkObservation, NetworkRecord, SecurityType};
pub use matcher::ProximityMatcher;
pub use store::{ClusterStore, StoreStats};

// Re-export the config from config module
pub use config::WifiMapConfig;
