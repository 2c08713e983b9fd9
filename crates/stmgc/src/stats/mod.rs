//! Stats Module - Transactional Heap Counters
//!
//! Collects counters about transactions for:
//! - Performance tuning
//! - Debugging & profiling
//!
//! Counters are plain relaxed atomics; a [`StatsSnapshot`] is a consistent
//! enough copy for reporting, serializable with serde.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// StmStats - statistics collector for the transactional heap
#[derive(Debug)]
pub struct StmStats {
    enabled: bool,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    materializations: AtomicU64,
    promotions: AtomicU64,
    bytes_promoted: AtomicUsize,
    weak_redirected: AtomicU64,
    weak_cleared: AtomicU64,
    tokens_issued: AtomicU64,
    start_time: std::time::Instant,
}

impl StmStats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            transactions_started: AtomicU64::new(0),
            transactions_committed: AtomicU64::new(0),
            transactions_aborted: AtomicU64::new(0),
            materializations: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            bytes_promoted: AtomicUsize::new(0),
            weak_redirected: AtomicU64::new(0),
            weak_cleared: AtomicU64::new(0),
            tokens_issued: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    #[inline]
    fn bump(&self, counter: &AtomicU64, by: u64) {
        if self.enabled {
            counter.fetch_add(by, Ordering::Relaxed);
        }
    }

    pub fn record_start(&self) {
        self.bump(&self.transactions_started, 1);
    }

    pub fn record_abort(&self) {
        self.bump(&self.transactions_aborted, 1);
    }

    pub fn record_materialize(&self) {
        self.bump(&self.materializations, 1);
    }

    pub fn record_token(&self) {
        self.bump(&self.tokens_issued, 1);
    }

    /// Record a finished commit
    pub fn record_commit(
        &self,
        promoted: usize,
        bytes_promoted: usize,
        weak_redirected: usize,
        weak_cleared: usize,
    ) {
        if !self.enabled {
            return;
        }
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
        self.promotions.fetch_add(promoted as u64, Ordering::Relaxed);
        self.bytes_promoted
            .fetch_add(bytes_promoted, Ordering::Relaxed);
        self.weak_redirected
            .fetch_add(weak_redirected as u64, Ordering::Relaxed);
        self.weak_cleared
            .fetch_add(weak_cleared as u64, Ordering::Relaxed);
    }

    /// Get a copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            materializations: self.materializations.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            bytes_promoted: self.bytes_promoted.load(Ordering::Relaxed),
            weak_redirected: self.weak_redirected.load(Ordering::Relaxed),
            weak_cleared: self.weak_cleared.load(Ordering::Relaxed),
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Reset statistics
    pub fn reset(&self) {
        for counter in [
            &self.transactions_started,
            &self.transactions_committed,
            &self.transactions_aborted,
            &self.materializations,
            &self.promotions,
            &self.weak_redirected,
            &self.weak_cleared,
            &self.tokens_issued,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.bytes_promoted.store(0, Ordering::Relaxed);
    }
}

impl Default for StmStats {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Summary statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub transactions_started: u64,
    pub transactions_committed: u64,
    pub transactions_aborted: u64,
    /// Private copies made by the write barrier
    pub materializations: u64,
    /// Private objects copied into the shared heap
    pub promotions: u64,
    pub bytes_promoted: usize,
    pub weak_redirected: u64,
    pub weak_cleared: u64,
    /// Identity tokens fabricated for private objects
    pub tokens_issued: u64,
    pub uptime_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = StmStats::new(true);
        stats.record_start();
        stats.record_materialize();
        stats.record_materialize();
        stats.record_commit(3, 120, 1, 2);

        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 1);
        assert_eq!(snap.transactions_committed, 1);
        assert_eq!(snap.materializations, 2);
        assert_eq!(snap.promotions, 3);
        assert_eq!(snap.bytes_promoted, 120);
        assert_eq!(snap.weak_redirected, 1);
        assert_eq!(snap.weak_cleared, 2);
    }

    #[test]
    fn test_disabled_stats_stay_zero() {
        let stats = StmStats::new(false);
        stats.record_start();
        stats.record_commit(1, 40, 0, 0);
        let snap = stats.snapshot();
        assert_eq!(snap.transactions_started, 0);
        assert_eq!(snap.bytes_promoted, 0);
    }

    #[test]
    fn test_reset() {
        let stats = StmStats::default();
        stats.record_abort();
        stats.record_commit(1, 40, 0, 0);
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.transactions_aborted, 0);
        assert_eq!(snap.bytes_promoted, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = StmStats::default().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["promotions"], 0);
    }
}
