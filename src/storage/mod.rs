// storage/mod.rs

pub mod metrics;
pub mod lmdb;
pub mod file;
pub mod memory;

use std::time::SystemTime;

use crate::error::Result;
use crate::config::subsystems::storage::{StorageBackendKind, StorageConfig};
use self::metrics::StorageMetricsStats;

/// Summary written alongside every snapshot
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotSummary {
    pub cluster_count: u64,
    pub network_count: u64,
    pub written_at: SystemTime,
}

/// Persistence collaborator of the cluster store.
///
/// Backends hold the serialized snapshot as an opaque string and must hand back exactly
/// what was last written.
pub trait StorageBackend: Send {
    /// The last snapshot written, or `None` if nothing has been stored yet
    fn read_snapshot(&self) -> Result<Option<String>>;

    /// Durably replace the stored snapshot
    fn write_snapshot(&mut self, snapshot: &str, summary: &SnapshotSummary) -> Result<()>;

    /// Get storage statistics
    fn metrics(&self) -> StorageMetricsStats;

    /// Human-readable description of where data goes
    fn describe(&self) -> String;

    /// Explicitly release the underlying resources
    fn close(&mut self) -> Result<()>;
}

/// Create the backend selected by the configuration
pub fn create_storage(config: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    log::debug!("Creating {} storage backend at {:?}", config.backend.as_str(), config.db_path);
    Ok(match config.backend {
        StorageBackendKind::Lmdb => Box::new(lmdb::LMDBStorage::new(&config.db_path, config)?),
        StorageBackendKind::File => Box::new(file::FileStorage::new(&config.db_path, config.use_fsync)),
        StorageBackendKind::Memory => Box::new(memory::MemoryStorage::new()),
    })
}
