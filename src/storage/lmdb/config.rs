// storage/lmdb/config.rs

use log::debug;
use lmdb_rkv::EnvironmentFlags;
use crate::config::subsystems::storage::StorageConfig;

// Database names/identifiers
pub const CF_SNAPSHOT: &str = "snapshot";     // Serialized cluster set
pub const CF_METADATA: &str = "metadata";     // SnapshotSummary of the last write

// Keys inside the databases
pub const SNAPSHOT_KEY: &[u8] = b"clusters";
pub const SUMMARY_KEY: &[u8] = b"summary";

// Default sizes for memory allocation
pub const DEFAULT_MAP_SIZE_MB: usize = 256;
pub const DEFAULT_MAX_READERS: u32 = 126;
pub const MAX_DBS: u32 = 2;

// Default flags
pub fn default_env_flags() -> EnvironmentFlags {
    EnvironmentFlags::NO_TLS
}

// Create environment options: (flags, max_readers, map_size in bytes)
pub fn create_env_options(config: &StorageConfig) -> (EnvironmentFlags, u32, usize) {
    let mut flags = default_env_flags();

    if !config.use_fsync {
        flags |= EnvironmentFlags::NO_SYNC;
    }

    let max_readers = config.lmdb_max_readers.unwrap_or(DEFAULT_MAX_READERS);
    let map_size = config.lmdb_map_size_mb.unwrap_or(DEFAULT_MAP_SIZE_MB) * 1024 * 1024;

    debug!("Created LMDB environment options:");
    debug!("  Flags: {:?}", flags);
    debug!("  Max readers: {}", max_readers);
    debug!("  Map size: {} bytes", map_size);

    (flags, max_readers, map_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsync_controls_no_sync_flag() {
        let mut config = StorageConfig::default();
        config.use_fsync = true;
        let (flags, _, _) = create_env_options(&config);
        assert!(!flags.contains(EnvironmentFlags::NO_SYNC));

        config.use_fsync = false;
        config.lmdb_map_size_mb = Some(8);
        let (flags, readers, map_size) = create_env_options(&config);
        assert!(flags.contains(EnvironmentFlags::NO_SYNC));
        assert_eq!(readers, 126);
        assert_eq!(map_size, 8 * 1024 * 1024);
    }
}
