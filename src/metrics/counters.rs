//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Foreign relay dials
    pub dials_total: AtomicU64,
    pub dials_failed: AtomicU64,

    // Registry entries
    pub tracks_published: AtomicU64,
    pub tracks_removed: AtomicU64,

    // Logical streams
    pub streams_opened: AtomicU64,
    pub streams_failed: AtomicU64,

    // Primary resumption
    pub reconnect_attempts: AtomicU64,
    pub reconnects_succeeded: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            dials_total: AtomicU64::new(0),
            dials_failed: AtomicU64::new(0),
            tracks_published: AtomicU64::new(0),
            tracks_removed: AtomicU64::new(0),
            streams_opened: AtomicU64::new(0),
            streams_failed: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnects_succeeded: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn dial_started(&self) {
        self.dials_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dial_failed(&self) {
        self.dials_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn track_published(&self) {
        self.tracks_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn track_removed(&self) {
        self.tracks_removed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stream_failed(&self) {
        self.streams_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn reconnect_succeeded(&self) {
        self.reconnects_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dials_total: self.dials_total.load(Ordering::Relaxed),
            dials_failed: self.dials_failed.load(Ordering::Relaxed),
            tracks_published: self.tracks_published.load(Ordering::Relaxed),
            tracks_removed: self.tracks_removed.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnects_succeeded: self.reconnects_succeeded.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub dials_total: u64,
    pub dials_failed: u64,
    pub tracks_published: u64,
    pub tracks_removed: u64,
    pub streams_opened: u64,
    pub streams_failed: u64,
    pub reconnect_attempts: u64,
    pub reconnects_succeeded: u64,
}

impl MetricsSnapshot {
    /// Foreign relay entries currently published
    pub fn foreign_active(&self) -> u64 {
        self.tracks_published.saturating_sub(self.tracks_removed)
    }
}
