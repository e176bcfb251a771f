//! The cluster store: owns every cluster, serializes mutation, and binds the in-memory set
//! to a storage backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use chrono::Utc;
use log::{debug, info, trace, warn};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::config::WifiMapConfig;
use crate::config::subsystems::{FlushPolicy, MatcherConfig, StorageConfig};
use crate::error::{Error, Result};
use crate::matcher::{MatchDecision, ProximityMatcher};
use crate::merger::{self, MergeStats};
use crate::snapshot;
use crate::storage::{self, SnapshotSummary, StorageBackend};
use crate::storage::memory::MemoryStorage;
use crate::storage::metrics::StorageMetricsStats;
use crate::types::{Cluster, ClusterId, Coordinate, NetworkObservation};

struct StoreState {
    clusters: BTreeMap<ClusterId, Cluster>,
    matcher: ProximityMatcher,
    next_id: ClusterId,
    // Sum of per-cluster record counts
    network_count: usize,
}

impl StoreState {
    fn new(matcher: ProximityMatcher) -> Self {
        Self {
            clusters: BTreeMap::new(),
            matcher,
            next_id: 1,
            network_count: 0,
        }
    }

    fn install(&mut self, clusters: BTreeMap<ClusterId, Cluster>) {
        self.next_id = clusters.keys().next_back().map_or(1, |id| id + 1);
        self.network_count = clusters.values().map(Cluster::network_count).sum();
        self.clusters = clusters;
        self.matcher.rebuild(&self.clusters);
    }

    fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            cluster_count: self.clusters.len() as u64,
            network_count: self.network_count as u64,
            written_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub clusters: usize,
    pub networks: usize,
    /// BSSIDs counted once no matter how many clusters saw them
    pub distinct_bssids: usize,
    /// Mutations not yet written to the backend
    pub pending_writes: usize,
    pub storage: StorageMetricsStats,
}

/// Spatial clusters of observed networks.
///
/// `ingest` holds the write lock for the whole merge, so readers never see half of a scan.
/// Persisting happens under a downgraded read lock: counts and exports stay available while
/// the backend writes, and no other ingest can slip in before the write completes.
pub struct ClusterStore {
    state: RwLock<StoreState>,
    backend: Mutex<Box<dyn StorageBackend>>,
    flush_policy: FlushPolicy,
    flush_batch_size: usize,
    pending: AtomicUsize,
}

impl std::fmt::Debug for ClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ClusterStore")
            .field("clusters", &state.clusters.len())
            .field("networks", &state.network_count)
            .field("flush_policy", &self.flush_policy)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl ClusterStore {
    /// Open the configured backend and load whatever it holds. Corrupt persisted data is
    /// logged and replaced by an empty store; only backend creation errors are returned.
    pub fn open(config: &WifiMapConfig) -> Result<Self> {
        let backend = storage::create_storage(&config.storage)?;
        let store = Self::with_backend(&config.matcher, &config.storage, backend);

        match store.load() {
            Ok(clusters) => info!("Loaded {} clusters ({} networks)", clusters, store.network_count()),
            Err(Error::CorruptPersistedState(reason)) => {
                warn!("Discarding unreadable persisted state, starting empty: {}", reason);
            }
            Err(e) => return Err(e),
        }
        Ok(store)
    }

    /// Empty store over an explicit backend; call `load` to populate it
    pub fn with_backend(
        matcher: &MatcherConfig,
        storage: &StorageConfig,
        backend: Box<dyn StorageBackend>,
    ) -> Self {
        debug!("Cluster store backed by {}", backend.describe());
        Self {
            state: RwLock::new(StoreState::new(ProximityMatcher::new(matcher))),
            backend: Mutex::new(backend),
            flush_policy: storage.flush_policy,
            flush_batch_size: storage.flush_batch_size.max(1),
            pending: AtomicUsize::new(0),
        }
    }

    /// Store that never touches disk
    pub fn in_memory(matcher: &MatcherConfig) -> Self {
        Self::with_backend(matcher, &StorageConfig::default(), Box::new(MemoryStorage::new()))
    }

    /// Fold one scan taken at `location` into the nearest cluster, creating one if none is
    /// within the proximity radius.
    ///
    /// Returns `Ok(None)` without touching anything when `observations` is empty. If the
    /// in-memory merge succeeds but the write-through fails, the merge is kept and
    /// `PersistenceWriteFailed` is returned; the next flush retries.
    pub fn ingest(
        &self,
        location: Coordinate,
        observations: &[NetworkObservation],
    ) -> Result<Option<ClusterId>> {
        location.validate()?;
        if observations.is_empty() {
            trace!("Empty scan at {}, nothing to ingest", location);
            return Ok(None);
        }

        let now = Utc::now();
        let mut guard = self.state.write();
        let state = &mut *guard;

        let (cluster_id, stats) = match state.matcher.locate(&state.clusters, location) {
            MatchDecision::Existing { cluster_id, distance_m } => {
                let cluster = state.clusters.get_mut(&cluster_id).ok_or_else(|| {
                    Error::storage(format!("matched cluster {} is not in the store", cluster_id))
                })?;
                let stats = merger::merge_all(cluster, observations, now);
                cluster.updated_at = now;
                trace!("Sample at {} joined cluster {} ({:.1} m from anchor)", location, cluster_id, distance_m);
                (cluster_id, stats)
            }
            MatchDecision::CreateNew => {
                let cluster_id = state.next_id;
                let mut cluster = Cluster::new(location, now);
                let stats = merger::merge_all(&mut cluster, observations, now);
                state.clusters.insert(cluster_id, cluster);
                state.matcher.register(cluster_id, location);
                state.next_id += 1;
                info!("Created cluster {} anchored at {}", cluster_id, location);
                (cluster_id, stats)
            }
        };
        state.network_count += stats.inserted;
        log_merge(cluster_id, &stats);

        self.after_mutation(guard)?;
        Ok(Some(cluster_id))
    }

    /// Networks per cluster, summed over clusters. A BSSID seen at two places counts twice.
    pub fn network_count(&self) -> usize {
        self.state.read().network_count
    }

    pub fn cluster_count(&self) -> usize {
        self.state.read().clusters.len()
    }

    /// Copy of one cluster
    pub fn cluster(&self, id: ClusterId) -> Option<Cluster> {
        self.state.read().clusters.get(&id).cloned()
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.state.read().clusters.keys().copied().collect()
    }

    /// Deterministic JSON of every cluster, the same text the backend stores
    pub fn export_snapshot(&self) -> Result<String> {
        let state = self.state.read();
        snapshot::encode(&state.clusters)
    }

    pub fn export_csv(&self) -> Result<String> {
        let state = self.state.read();
        snapshot::encode_csv(&state.clusters)
    }

    /// Replace the in-memory set with what the backend holds.
    ///
    /// Unreadable or invalid data leaves the store empty and returns `CorruptPersistedState`.
    pub fn load(&self) -> Result<usize> {
        let mut state = self.state.write();
        let read = self.backend.lock().read_snapshot();

        let decoded = match read {
            Ok(None) => Ok(BTreeMap::new()),
            Ok(Some(text)) => snapshot::decode(&text),
            Err(Error::CorruptPersistedState(reason)) => Err(Error::CorruptPersistedState(reason)),
            Err(e) => Err(Error::corrupt(format!("backend read failed: {}", e))),
        };

        self.pending.store(0, Ordering::Relaxed);
        match decoded {
            Ok(clusters) => {
                state.install(clusters);
                debug!("Store loaded: {} clusters, next id {}", state.clusters.len(), state.next_id);
                Ok(state.clusters.len())
            }
            Err(e) => {
                state.install(BTreeMap::new());
                Err(e)
            }
        }
    }

    /// Replace the in-memory set with a previously exported snapshot. Invalid input leaves
    /// the current state untouched. The restored state is persisted per the flush policy.
    pub fn restore(&self, snapshot_text: &str) -> Result<usize> {
        let clusters = snapshot::decode(snapshot_text)?;
        let mut guard = self.state.write();
        guard.install(clusters);
        let restored = guard.clusters.len();
        info!("Restored {} clusters from snapshot", restored);
        self.after_mutation(guard)?;
        Ok(restored)
    }

    /// Write the current state to the backend
    pub fn flush(&self) -> Result<()> {
        let state = self.state.read();
        self.persist(&state)?;
        self.pending.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Flush outstanding mutations and release the backend
    pub fn close(&self) -> Result<()> {
        if self.pending.load(Ordering::Relaxed) > 0 {
            self.flush()?;
        }
        self.backend.lock().close()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            clusters: state.clusters.len(),
            networks: state.network_count,
            distinct_bssids: snapshot::unique_bssids(&state.clusters).len(),
            pending_writes: self.pending.load(Ordering::Relaxed),
            storage: self.backend.lock().metrics(),
        }
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        self.flush_policy
    }

    fn after_mutation(&self, guard: RwLockWriteGuard<'_, StoreState>) -> Result<()> {
        let pending = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        let due = match self.flush_policy {
            FlushPolicy::EveryIngest => true,
            FlushPolicy::Batched => pending >= self.flush_batch_size,
            FlushPolicy::Manual => false,
        };
        if !due {
            return Ok(());
        }

        let state = RwLockWriteGuard::downgrade(guard);
        self.persist(&state)?;
        self.pending.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let text = snapshot::encode(&state.clusters)
            .map_err(|e| Error::write_failed(format!("could not serialize snapshot: {}", e)))?;
        let summary = state.summary();

        self.backend
            .lock()
            .write_snapshot(&text, &summary)
            .map_err(|e| {
                warn!("Snapshot write failed, keeping {} pending change(s) in memory: {}",
                      self.pending.load(Ordering::Relaxed), e);
                Error::write_failed(e.to_string())
            })
    }
}

fn log_merge(cluster_id: ClusterId, stats: &MergeStats) {
    debug!(
        "Cluster {}: {} new, {} updated, {} unchanged network(s)",
        cluster_id, stats.inserted, stats.updated, stats.duplicates
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::SnapshotCell;
    use crate::types::SecurityType;

    /// Backend whose writes fail until told otherwise
    struct FlakyStorage {
        fail: std::sync::Arc<std::sync::atomic::AtomicBool>,
        inner: MemoryStorage,
    }

    impl StorageBackend for FlakyStorage {
        fn read_snapshot(&self) -> Result<Option<String>> {
            self.inner.read_snapshot()
        }
        fn write_snapshot(&mut self, snapshot: &str, summary: &SnapshotSummary) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
            }
            self.inner.write_snapshot(snapshot, summary)
        }
        fn metrics(&self) -> StorageMetricsStats {
            self.inner.metrics()
        }
        fn describe(&self) -> String {
            "flaky".to_string()
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn obs(bssid: &str, ssid: &str, signal: i32) -> NetworkObservation {
        NetworkObservation::new(ssid, bssid, signal, 2412, "[WPA2-PSK-CCMP][ESS]")
    }

    fn memory_store(policy: FlushPolicy, batch: usize) -> (ClusterStore, SnapshotCell) {
        let backend = MemoryStorage::new();
        let cell = backend.handle();
        let storage = StorageConfig {
            flush_policy: policy,
            flush_batch_size: batch,
            ..StorageConfig::default()
        };
        let store = ClusterStore::with_backend(&MatcherConfig::default(), &storage, Box::new(backend));
        (store, cell)
    }

    #[test]
    fn walkthrough_two_sites() {
        let (store, cell) = memory_store(FlushPolicy::EveryIngest, 1);

        let c1 = store.ingest(Coordinate::new(40.0, -75.0), &[obs("AA:BB", "Home", -50)]).unwrap().unwrap();
        assert_eq!(store.network_count(), 1);

        let again = store.ingest(Coordinate::new(40.0001, -75.0001), &[obs("AA:BB", "Home", -45)]).unwrap();
        assert_eq!(again, Some(c1));
        assert_eq!(store.cluster_count(), 1);
        assert_eq!(store.network_count(), 1);
        let record = store.cluster(c1).unwrap().network("aa:bb").cloned().unwrap();
        assert_eq!(record.signal_dbm, -45);
        assert_eq!(record.security, SecurityType::Wpa2);

        let c2 = store
            .ingest(Coordinate::new(41.0, -76.0), &[obs("AA:BB", "Home", -70), obs("CC:DD", "Cafe", -60)])
            .unwrap()
            .unwrap();
        assert_ne!(c1, c2);
        assert!(c2 > c1);
        assert_eq!(store.cluster_count(), 2);
        assert_eq!(store.network_count(), 3);
        assert_eq!(store.stats().distinct_bssids, 2);

        // every ingest was written through
        assert_eq!(cell.lock().as_deref(), Some(store.export_snapshot().unwrap().as_str()));
    }

    #[test]
    fn anchor_never_moves() {
        let (store, _) = memory_store(FlushPolicy::Manual, 1);
        let id = store.ingest(Coordinate::new(10.0, 10.0), &[obs("01", "a", -40)]).unwrap().unwrap();
        store.ingest(Coordinate::new(10.0001, 10.0), &[obs("02", "b", -40)]).unwrap();
        store.ingest(Coordinate::new(10.0002, 10.0), &[obs("03", "c", -40)]).unwrap();
        assert_eq!(store.cluster(id).unwrap().anchor(), Coordinate::new(10.0, 10.0));
    }

    #[test]
    fn first_seen_survives_updates() {
        let (store, _) = memory_store(FlushPolicy::Manual, 1);
        let here = Coordinate::new(52.52, 13.405);
        let id = store.ingest(here, &[obs("aa", "x", -80)]).unwrap().unwrap();
        let first = store.cluster(id).unwrap().network("aa").unwrap().first_seen;
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.ingest(here, &[obs("AA", "y", -30)]).unwrap();

        let cluster = store.cluster(id).unwrap();
        let record = cluster.network("aa").unwrap();
        assert_eq!(cluster.network_count(), 1);
        assert_eq!(record.first_seen, first);
        assert!(record.last_seen > first);
        assert_eq!(record.ssid, "y");
        assert!(cluster.updated_at > cluster.created_at);
    }

    #[test]
    fn empty_scan_is_a_no_op() {
        let (store, cell) = memory_store(FlushPolicy::EveryIngest, 1);
        assert_eq!(store.ingest(Coordinate::new(1.0, 1.0), &[]).unwrap(), None);
        assert_eq!(store.cluster_count(), 0);
        assert!(cell.lock().is_none());

        let id = store.ingest(Coordinate::new(1.0, 1.0), &[obs("aa", "", -1)]).unwrap().unwrap();
        let before = store.cluster(id).unwrap();
        assert_eq!(store.ingest(Coordinate::new(1.0, 1.0), &[]).unwrap(), None);
        assert_eq!(store.cluster(id).unwrap(), before);
    }

    #[test]
    fn invalid_location_is_rejected_before_mutation() {
        let (store, cell) = memory_store(FlushPolicy::EveryIngest, 1);
        for bad in [Coordinate::new(f64::NAN, 0.0), Coordinate::new(91.0, 0.0), Coordinate::new(0.0, -180.1)] {
            let err = store.ingest(bad, &[obs("aa", "", -1)]).unwrap_err();
            assert!(matches!(err, Error::InvalidLocation(_)));
        }
        assert_eq!(store.cluster_count(), 0);
        assert!(cell.lock().is_none());
    }

    #[test]
    fn network_count_matches_per_cluster_sum() {
        let (store, _) = memory_store(FlushPolicy::Manual, 1);
        let sites = [(0.0, 0.0), (0.0, 0.01), (0.01, 0.0), (0.0, 0.0)];
        for (i, (lat, lon)) in sites.iter().enumerate() {
            let scan: Vec<_> = (0..=i).map(|n| obs(&format!("0{}", n), "net", -50)).collect();
            store.ingest(Coordinate::new(*lat, *lon), &scan).unwrap();
        }
        let sum: usize = store
            .cluster_ids()
            .into_iter()
            .map(|id| store.cluster(id).unwrap().network_count())
            .sum();
        assert_eq!(store.cluster_count(), 3);
        assert_eq!(store.network_count(), sum);
        assert_eq!(sum, 4 + 2 + 3);
    }

    #[test]
    fn batched_policy_flushes_every_n_ingests() {
        let (store, cell) = memory_store(FlushPolicy::Batched, 3);
        let here = Coordinate::new(0.0, 0.0);
        store.ingest(here, &[obs("01", "", -1)]).unwrap();
        store.ingest(here, &[obs("02", "", -1)]).unwrap();
        assert!(cell.lock().is_none());
        assert_eq!(store.stats().pending_writes, 2);

        store.ingest(here, &[obs("03", "", -1)]).unwrap();
        assert!(cell.lock().is_some());
        assert_eq!(store.stats().pending_writes, 0);
    }

    #[test]
    fn manual_policy_writes_on_flush_and_close() {
        let (store, cell) = memory_store(FlushPolicy::Manual, 1);
        store.ingest(Coordinate::new(0.0, 0.0), &[obs("01", "", -1)]).unwrap();
        assert!(cell.lock().is_none());
        store.flush().unwrap();
        assert!(cell.lock().is_some());

        store.ingest(Coordinate::new(5.0, 5.0), &[obs("02", "", -1)]).unwrap();
        store.close().unwrap();
        assert_eq!(cell.lock().as_deref(), Some(store.export_snapshot().unwrap().as_str()));
    }

    #[test]
    fn write_failure_keeps_memory_state_and_retries() {
        let fail = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
        let inner = MemoryStorage::new();
        let cell = inner.handle();
        let backend = FlakyStorage { fail: fail.clone(), inner };
        let store = ClusterStore::with_backend(&MatcherConfig::default(), &StorageConfig::default(), Box::new(backend));

        let err = store.ingest(Coordinate::new(0.0, 0.0), &[obs("aa", "", -1)]).unwrap_err();
        assert!(matches!(err, Error::PersistenceWriteFailed(_)));
        assert_eq!(store.network_count(), 1);
        assert_eq!(store.stats().pending_writes, 1);
        assert!(matches!(store.flush(), Err(Error::PersistenceWriteFailed(_))));

        // the store keeps working after the failure
        fail.store(false, Ordering::SeqCst);
        let id = store.ingest(Coordinate::new(0.0, 0.0), &[obs("bb", "", -1)]).unwrap();
        assert_eq!(id, Some(1));
        assert_eq!(store.network_count(), 2);
        assert_eq!(store.stats().pending_writes, 0);
        assert_eq!(cell.lock().as_deref(), Some(store.export_snapshot().unwrap().as_str()));
    }

    #[test]
    fn load_round_trips_export() {
        let (store, _) = memory_store(FlushPolicy::Manual, 1);
        store.ingest(Coordinate::new(40.0, -75.0), &[obs("aa", "Home", -50), obs("bb", "", -90)]).unwrap();
        store.ingest(Coordinate::new(41.0, -76.0), &[obs("aa", "Home", -70)]).unwrap();
        let exported = store.export_snapshot().unwrap();

        let reloaded = ClusterStore::with_backend(
            &MatcherConfig::default(),
            &StorageConfig::default(),
            Box::new(MemoryStorage::with_snapshot(exported.clone())),
        );
        assert_eq!(reloaded.load().unwrap(), 2);
        assert_eq!(reloaded.network_count(), store.network_count());
        assert_eq!(reloaded.export_snapshot().unwrap(), exported);

        // ids continue after the highest loaded id, and the matcher index was rebuilt
        let id = reloaded.ingest(Coordinate::new(41.00001, -76.0), &[obs("cc", "", -1)]).unwrap();
        assert_eq!(id, Some(2));
        let id = reloaded.ingest(Coordinate::new(-10.0, 100.0), &[obs("cc", "", -1)]).unwrap();
        assert_eq!(id, Some(3));
    }

    #[test]
    fn corrupt_backend_loads_empty() {
        let store = ClusterStore::with_backend(
            &MatcherConfig::default(),
            &StorageConfig::default(),
            Box::new(MemoryStorage::with_snapshot("{ this is not a snapshot")),
        );
        assert!(matches!(store.load(), Err(Error::CorruptPersistedState(_))));
        assert_eq!(store.cluster_count(), 0);
        assert_eq!(store.ingest(Coordinate::new(0.0, 0.0), &[obs("aa", "", -1)]).unwrap(), Some(1));
    }

    #[test]
    fn restore_rejects_bad_input_without_clearing() {
        let (store, _) = memory_store(FlushPolicy::Manual, 1);
        store.ingest(Coordinate::new(0.0, 0.0), &[obs("aa", "", -1)]).unwrap();
        assert!(store.restore("[{\"id\": 1}]").is_err());
        assert_eq!(store.cluster_count(), 1);

        assert_eq!(store.restore("[]").unwrap(), 0);
        assert_eq!(store.network_count(), 0);
        assert_eq!(store.stats().pending_writes, 2);
    }

    #[test]
    fn readers_never_see_half_a_scan() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(ClusterStore::in_memory(&MatcherConfig::default()));
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..200 {
                    let scan: Vec<_> = (0..4).map(|n| obs(&format!("{}:{}", round, n), "", -1)).collect();
                    store.ingest(Coordinate::new(0.0, 0.0), &scan).unwrap();
                }
            })
        };
        let reader = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(store.network_count() % 4, 0);
                    let text = store.export_snapshot().unwrap();
                    assert_eq!(text.matches("\"bssid\"").count() % 4, 0);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(store.network_count(), 800);
    }
}
