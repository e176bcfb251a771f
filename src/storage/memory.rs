// storage/memory.rs

use std::sync::Arc;
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::metrics::{StorageMetrics, StorageMetricsStats};
use super::{SnapshotSummary, StorageBackend};

/// Shared cell holding the last written snapshot
pub type SnapshotCell = Arc<Mutex<Option<String>>>;

/// Non-durable backend for tests and throwaway runs. Clones of `handle()` observe writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    cell: SnapshotCell,
    metrics: StorageMetrics,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing snapshot, as if it had been written earlier
    pub fn with_snapshot<S: Into<String>>(snapshot: S) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Some(snapshot.into()))),
            metrics: StorageMetrics::new(),
        }
    }

    pub fn handle(&self) -> SnapshotCell {
        Arc::clone(&self.cell)
    }
}

impl StorageBackend for MemoryStorage {
    fn read_snapshot(&self) -> Result<Option<String>> {
        let snapshot = self.cell.lock().clone();
        if let Some(text) = &snapshot {
            self.metrics.record_read(text.len());
        }
        Ok(snapshot)
    }

    fn write_snapshot(&mut self, snapshot: &str, _summary: &SnapshotSummary) -> Result<()> {
        *self.cell.lock() = Some(snapshot.to_string());
        self.metrics.record_write(snapshot.len());
        Ok(())
    }

    fn metrics(&self) -> StorageMetricsStats {
        self.metrics.get_stats()
    }

    fn describe(&self) -> String {
        "memory (not persisted)".to_string()
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
