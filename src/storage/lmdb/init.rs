// storage/lmdb/init.rs

use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::{info, debug, error};
use lmdb_rkv::{Environment, Database, DatabaseFlags};

use crate::error::{Error, Result};
use crate::config::subsystems::storage::StorageConfig;
use crate::storage::metrics::StorageMetrics;

use super::LMDBStorage;
use super::config::{create_env_options, CF_METADATA, CF_SNAPSHOT, MAX_DBS};

impl LMDBStorage {
    /// Opens (or creates) the LMDB environment at `path`
    pub fn new<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        // Make sure the directory exists
        if !path_buf.exists() {
            fs::create_dir_all(&path_buf)
                .map_err(|e| Error::storage(format!("Failed to create database directory: {}", e)))?;
        }

        let (env_flags, max_readers, map_size) = create_env_options(config);

        info!(
            "Creating LMDB environment at {:?} with map_size={} MB, max_readers={}",
            path_buf,
            map_size / (1024 * 1024),
            max_readers
        );

        let env = Self::create_environment(&path_buf, env_flags, max_readers, map_size)?;
        let snapshot_db = Self::create_database(&env, CF_SNAPSHOT)?;
        let metadata_db = Self::create_database(&env, CF_METADATA)?;

        Ok(Self {
            env: Arc::new(env),
            snapshot_db,
            metadata_db,
            metrics: Arc::new(StorageMetrics::default()),
            db_path: path_buf,
            map_size,
        })
    }

    /// Helper method to create an LMDB environment with error handling
    fn create_environment(
        path: &Path,
        flags: lmdb_rkv::EnvironmentFlags,
        max_readers: u32,
        map_size: usize,
    ) -> Result<Environment> {
        debug!("Creating LMDB environment at {:?}", path);

        Environment::new()
            .set_flags(flags)
            .set_max_readers(max_readers)
            .set_max_dbs(MAX_DBS)
            .set_map_size(map_size)
            .open(path)
            .map_err(|e| {
                error!("Failed to open LMDB environment at {:?}: {}", path, e);
                Error::Database(format!("Failed to open environment: {}", e))
            })
    }

    fn create_database(env: &Environment, name: &str) -> Result<Database> {
        env.create_db(Some(name), DatabaseFlags::empty())
            .map_err(|e| Error::Database(format!("Failed to create database {}: {}", name, e)))
    }
}
