// storage/lmdb/mod.rs

pub mod config;
pub mod init;

use std::path::PathBuf;
use std::sync::Arc;
use log::{info, debug};
use lmdb_rkv::{Environment, Database, Transaction, WriteFlags, Error as LmdbError};

use crate::error::{Error, Result};
use crate::storage::metrics::{StorageMetrics, StorageMetricsStats};
use super::{SnapshotSummary, StorageBackend};
use self::config::{SNAPSHOT_KEY, SUMMARY_KEY};

/// Snapshot storage in an LMDB environment: one database for the snapshot text, one for
/// the bincode-encoded summary, both replaced in a single write transaction
pub struct LMDBStorage {
    pub(crate) env: Arc<Environment>,
    pub(crate) snapshot_db: Database,
    pub(crate) metadata_db: Database,
    pub(crate) metrics: Arc<StorageMetrics>,
    pub(crate) db_path: PathBuf,
    pub(crate) map_size: usize,
}

// Debug impl needs to be manual because Environment is opaque
impl std::fmt::Debug for LMDBStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LMDBStorage")
            .field("db_path", &self.db_path.display())
            .field("map_size", &self.map_size)
            .finish()
    }
}

impl LMDBStorage {
    /// Summary of the last committed snapshot, if any
    pub fn read_summary(&self) -> Result<Option<SnapshotSummary>> {
        let txn = self.env.begin_ro_txn()
            .map_err(|e| Error::Database(format!("Failed to start read transaction: {}", e)))?;
        let summary: Option<SnapshotSummary> = match txn.get(self.metadata_db, &SUMMARY_KEY) {
            Ok(bytes) => Some(bincode::deserialize(bytes)?),
            Err(LmdbError::NotFound) => None,
            Err(e) => return Err(Error::Database(format!("Failed to read summary: {}", e))),
        };
        Ok(summary)
    }

    fn put_snapshot(&self, snapshot: &str, summary: &SnapshotSummary) -> Result<()> {
        let serialized = bincode::serialize(summary)?;

        let mut txn = self.env.begin_rw_txn()
            .map_err(|e| Error::Database(format!("Failed to start write transaction: {}", e)))?;
        txn.put(self.snapshot_db, &SNAPSHOT_KEY, &snapshot, WriteFlags::empty())
            .map_err(|e| Error::Database(format!("Failed to store snapshot: {}", e)))?;
        txn.put(self.metadata_db, &SUMMARY_KEY, &serialized, WriteFlags::empty())
            .map_err(|e| Error::Database(format!("Failed to store snapshot summary: {}", e)))?;
        txn.commit()
            .map_err(|e| Error::Database(format!("Failed to commit snapshot transaction: {}", e)))?;
        Ok(())
    }
}

impl StorageBackend for LMDBStorage {
    fn read_snapshot(&self) -> Result<Option<String>> {
        let txn = self.env.begin_ro_txn()
            .map_err(|e| Error::Database(format!("Failed to start read transaction: {}", e)))?;

        let bytes = match txn.get(self.snapshot_db, &SNAPSHOT_KEY) {
            Ok(bytes) => bytes.to_vec(),
            Err(LmdbError::NotFound) => {
                debug!("No snapshot stored in {:?}", self.db_path);
                return Ok(None);
            }
            Err(e) => {
                self.metrics.increment_failed_ops();
                return Err(Error::Database(format!("Failed to read snapshot: {}", e)));
            }
        };
        self.metrics.record_read(bytes.len());

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| Error::corrupt(format!("snapshot is not valid UTF-8: {}", e)))
    }

    fn write_snapshot(&mut self, snapshot: &str, summary: &SnapshotSummary) -> Result<()> {
        match self.put_snapshot(snapshot, summary) {
            Ok(()) => {
                self.metrics.record_write(snapshot.len());
                debug!(
                    "Stored snapshot of {} clusters / {} networks ({} bytes)",
                    summary.cluster_count, summary.network_count, snapshot.len()
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_failed_ops();
                Err(e)
            }
        }
    }

    fn metrics(&self) -> StorageMetricsStats {
        self.metrics.get_stats()
    }

    fn describe(&self) -> String {
        format!("lmdb at {:?} (map size {} MB)", self.db_path, self.map_size / (1024 * 1024))
    }

    fn close(&mut self) -> Result<()> {
        info!("Closing LMDB database at {:?}", self.db_path);
        self.env.sync(true)
            .map_err(|e| Error::Database(format!("Failed to sync environment: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::subsystems::storage::StorageConfig;
    use std::time::SystemTime;

    fn summary(clusters: u64) -> SnapshotSummary {
        SnapshotSummary { cluster_count: clusters, network_count: clusters * 2, written_at: SystemTime::now() }
    }

    #[test]
    fn fresh_environment_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LMDBStorage::new(dir.path().join("db"), &StorageConfig::default()).unwrap();
        assert_eq!(storage.read_snapshot().unwrap(), None);
        assert_eq!(storage.read_summary().unwrap(), None);
    }

    #[test]
    fn snapshot_and_summary_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let config = StorageConfig::default();
        let written = summary(3);
        {
            let mut storage = LMDBStorage::new(&path, &config).unwrap();
            storage.write_snapshot("[]", &summary(1)).unwrap();
            storage.write_snapshot("[{\"id\":1}]", &written).unwrap();
            assert_eq!(storage.metrics().write_operations, 2);
            storage.close().unwrap();
        }
        let storage = LMDBStorage::new(&path, &config).unwrap();
        assert_eq!(storage.read_snapshot().unwrap().as_deref(), Some("[{\"id\":1}]"));
        assert_eq!(storage.read_summary().unwrap(), Some(written));
        assert_eq!(storage.metrics().read_operations, 1);
    }
}
