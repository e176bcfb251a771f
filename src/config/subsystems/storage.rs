// src/config/subsystems/storage.rs

use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use crate::error::{Error, Result};
use crate::config::FromIni;

/// Which persistence medium backs the cluster store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackendKind {
    Lmdb,
    File,
    Memory,
}

impl StorageBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendKind::Lmdb => "lmdb",
            StorageBackendKind::File => "file",
            StorageBackendKind::Memory => "memory",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "lmdb" => Some(Self::Lmdb),
            "file" | "json" => Some(Self::File),
            "memory" | "none" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// When ingests are written through to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushPolicy {
    /// Write after every mutating ingest
    EveryIngest,
    /// Write once `flush_batch_size` ingests are pending
    Batched,
    /// Only on explicit `flush()`
    Manual,
}

impl FlushPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushPolicy::EveryIngest => "every_ingest",
            FlushPolicy::Batched => "batched",
            FlushPolicy::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "every_ingest" | "always" => Some(Self::EveryIngest),
            "batched" => Some(Self::Batched),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,

    // Directory for lmdb, file path for the json backend
    pub db_path: PathBuf,

    pub use_fsync: bool,

    pub flush_policy: FlushPolicy,
    pub flush_batch_size: usize,

    // LMDB-specific settings
    pub lmdb_max_readers: Option<u32>,
    pub lmdb_map_size_mb: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Lmdb,
            db_path: PathBuf::from("db/clusters"),
            use_fsync: true,
            flush_policy: FlushPolicy::EveryIngest,
            flush_batch_size: 16,
            lmdb_max_readers: Some(126),
            lmdb_map_size_mb: Some(256),
        }
    }
}

impl FromIni for StorageConfig {
    fn from_ini_section(&mut self, section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        if section_name != "storage" {
            return None;
        }

        match key {
            "backend" => {
                match StorageBackendKind::from_str(value) {
                    Some(kind) => {
                        self.backend = kind;
                        Some(Ok(()))
                    },
                    None => Some(Err(Error::Config(
                        format!("Invalid backend (must be lmdb/file/memory): {}", value)
                    ))),
                }
            },
            "db_path" => {
                self.db_path = PathBuf::from(value.trim_matches('"'));
                Some(Ok(()))
            },
            "use_fsync" => {
                match value.parse() {
                    Ok(flag) => {
                        self.use_fsync = flag;
                        Some(Ok(()))
                    },
                    Err(_) => Some(Err(Error::Config(
                        format!("Invalid use_fsync value (must be true/false): {}", value)
                    ))),
                }
            },
            "flush_policy" => {
                match FlushPolicy::from_str(value) {
                    Some(policy) => {
                        self.flush_policy = policy;
                        Some(Ok(()))
                    },
                    None => Some(Err(Error::Config(
                        format!("Invalid flush_policy (must be every_ingest/batched/manual): {}", value)
                    ))),
                }
            },
            "flush_batch_size" => {
                match value.parse() {
                    Ok(size) if size > 0 => {
                        self.flush_batch_size = size;
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid flush_batch_size (must be > 0): {}", value)
                    ))),
                }
            },
            "lmdb_max_readers" => {
                match value.parse() {
                    Ok(readers) if readers > 0 => {
                        self.lmdb_max_readers = Some(readers);
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid lmdb_max_readers (must be > 0): {}", value)
                    ))),
                }
            },
            "lmdb_map_size_mb" => {
                match value.parse() {
                    Ok(size) if size > 0 => {
                        self.lmdb_map_size_mb = Some(size);
                        Some(Ok(()))
                    },
                    _ => Some(Err(Error::Config(
                        format!("Invalid lmdb_map_size_mb (must be > 0): {}", value)
                    ))),
                }
            },

            // Unknown setting
            _ => None,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend != StorageBackendKind::Memory && self.db_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "db_path must be set for persistent backends".to_string()
            ));
        }

        if self.flush_batch_size == 0 {
            return Err(Error::Config(
                "flush_batch_size must be greater than 0".to_string()
            ));
        }

        if let Some(map_size) = self.lmdb_map_size_mb {
            if map_size < 1 {
                return Err(Error::Config(
                    "lmdb_map_size_mb should be at least 1MB".to_string()
                ));
            }
        }

        Ok(())
    }

    /// Get a human-readable description of the configuration
    pub fn describe(&self) -> String {
        format!(
            "Storage Configuration:\n\
             - Backend: {}\n\
             - Database Path: {:?}\n\
             - Sync Mode: {}\n\
             - Flush Policy: {} (batch size {})\n\
             - LMDB Map Size: {} MB\n\
             - LMDB Max Readers: {}",
            self.backend.as_str(),
            self.db_path,
            if self.use_fsync { "sync (fsync)" } else { "async" },
            self.flush_policy.as_str(),
            self.flush_batch_size,
            self.lmdb_map_size_mb.unwrap_or(256),
            self.lmdb_max_readers.unwrap_or(126)
        )
    }
}
