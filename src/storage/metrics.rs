use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use log::trace;

/// Tracks snapshot reads and writes against a storage backend
#[derive(Debug)]
pub struct StorageMetrics {
    write_ops: AtomicU64,
    read_ops: AtomicU64,
    failed_ops: AtomicU64,
    total_bytes_written: AtomicU64,
    total_bytes_read: AtomicU64,
    start_time: Instant,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self {
            write_ops: AtomicU64::new(0),
            read_ops: AtomicU64::new(0),
            failed_ops: AtomicU64::new(0),
            total_bytes_written: AtomicU64::new(0),
            total_bytes_read: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_write(&self, bytes: usize) {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.read_ops.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn increment_failed_ops(&self) {
        self.failed_ops.fetch_add(1, Ordering::Relaxed);
        trace!("Failed operation recorded. Total failures: {}", self.failed_ops.load(Ordering::Relaxed));
    }

    pub fn get_stats(&self) -> StorageMetricsStats {
        StorageMetricsStats {
            write_operations: self.write_ops.load(Ordering::Relaxed),
            read_operations: self.read_ops.load(Ordering::Relaxed),
            failed_operations: self.failed_ops.load(Ordering::Relaxed),
            bytes_written: self.total_bytes_written.load(Ordering::Relaxed),
            bytes_read: self.total_bytes_read.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for StorageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageMetricsStats {
    pub write_operations: u64,
    pub read_operations: u64,
    pub failed_operations: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub uptime_seconds: u64,
}

impl StorageMetricsStats {
    pub fn failure_rate(&self) -> f64 {
        let total_ops = self.write_operations + self.read_operations + self.failed_operations;
        if total_ops == 0 {
            return 0.0;
        }
        self.failed_operations as f64 / total_ops as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = StorageMetrics::new();
        metrics.record_write(100);
        metrics.record_write(50);
        metrics.record_read(10);
        metrics.increment_failed_ops();

        let stats = metrics.get_stats();
        assert_eq!(stats.write_operations, 2);
        assert_eq!(stats.bytes_written, 150);
        assert_eq!(stats.read_operations, 1);
        assert_eq!(stats.bytes_read, 10);
        assert_eq!(stats.failed_operations, 1);
        assert!((stats.failure_rate() - 0.25).abs() < f64::EPSILON);
    }
}
