// storage/file.rs

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use log::{debug, info};

use crate::error::{Error, Result};
use crate::storage::metrics::{StorageMetrics, StorageMetricsStats};
use super::{SnapshotSummary, StorageBackend};

/// Snapshot kept as a single JSON file, replaced atomically through a sibling temp file
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    use_fsync: bool,
    metrics: StorageMetrics,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P, use_fsync: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            use_fsync,
            metrics: StorageMetrics::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    fn replace_file(&self, snapshot: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(snapshot.as_bytes())?;
            file.flush()?;
            if self.use_fsync {
                file.sync_all()?;
            }
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn read_snapshot(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                self.metrics.record_read(bytes.len());
                String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|e| Error::corrupt(format!("{:?} is not valid UTF-8: {}", self.path, e)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot file at {:?}", self.path);
                Ok(None)
            }
            Err(e) => {
                self.metrics.increment_failed_ops();
                Err(Error::Io(e))
            }
        }
    }

    fn write_snapshot(&mut self, snapshot: &str, summary: &SnapshotSummary) -> Result<()> {
        match self.replace_file(snapshot) {
            Ok(()) => {
                self.metrics.record_write(snapshot.len());
                debug!(
                    "Wrote {} clusters / {} networks to {:?}",
                    summary.cluster_count, summary.network_count, self.path
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.increment_failed_ops();
                // The temp file may not exist yet
                let _ = fs::remove_file(self.temp_path());
                Err(e)
            }
        }
    }

    fn metrics(&self) -> StorageMetricsStats {
        self.metrics.get_stats()
    }

    fn describe(&self) -> String {
        format!("json file at {:?}", self.path)
    }

    fn close(&mut self) -> Result<()> {
        info!("Closing snapshot file storage at {:?}", self.path);
        Ok(())
    }
}
