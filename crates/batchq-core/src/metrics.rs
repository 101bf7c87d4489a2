//! Atomic counters for coalescer observability.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one coalescer instance.
pub struct CoalescerMetrics {
    /// Total non-empty submissions accepted.
    pub submissions_total: AtomicU64,
    /// Total queries accepted across all submissions.
    pub queries_submitted: AtomicU64,
    /// Total batches dispatched downstream.
    pub batches_dispatched: AtomicU64,
    /// Total queries dispatched downstream.
    pub queries_dispatched: AtomicU64,
    /// Total submissions included in dispatched batches. A submission
    /// spanning several batches counts once per batch it touched.
    pub submissions_batched: AtomicU64,
    /// Batches whose executor call returned an error.
    pub batches_failed: AtomicU64,
    /// Total time spent inside the downstream executor (microseconds).
    pub flush_duration_us_total: AtomicU64,
    /// Total time submitters spent parked on their outcome slot (microseconds).
    pub wait_duration_us_total: AtomicU64,
    /// Largest batch dispatched.
    pub max_batch_size_observed: AtomicU64,
}

impl CoalescerMetrics {
    /// Create zeroed metrics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            submissions_total: AtomicU64::new(0),
            queries_submitted: AtomicU64::new(0),
            batches_dispatched: AtomicU64::new(0),
            queries_dispatched: AtomicU64::new(0),
            submissions_batched: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            flush_duration_us_total: AtomicU64::new(0),
            wait_duration_us_total: AtomicU64::new(0),
            max_batch_size_observed: AtomicU64::new(0),
        }
    }

    /// Record an accepted submission.
    pub fn record_submission(&self, queries: u64) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);
        self.queries_submitted.fetch_add(queries, Ordering::Relaxed);
    }

    /// Record a completed batch dispatch.
    pub fn record_flush(&self, queries: u64, submissions: u64, duration_us: u64, failed: bool) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.queries_dispatched.fetch_add(queries, Ordering::Relaxed);
        self.submissions_batched
            .fetch_add(submissions, Ordering::Relaxed);
        if failed {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.flush_duration_us_total
            .fetch_add(duration_us, Ordering::Relaxed);
        self.max_batch_size_observed
            .fetch_max(queries, Ordering::Relaxed);
    }

    /// Record time a submitter spent parked on its outcome slot.
    pub fn record_wait(&self, duration_us: u64) {
        self.wait_duration_us_total
            .fetch_add(duration_us, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CoalescerMetricsSnapshot {
        CoalescerMetricsSnapshot {
            submissions_total: self.submissions_total.load(Ordering::Relaxed),
            queries_submitted: self.queries_submitted.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            queries_dispatched: self.queries_dispatched.load(Ordering::Relaxed),
            submissions_batched: self.submissions_batched.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            flush_duration_us_total: self.flush_duration_us_total.load(Ordering::Relaxed),
            wait_duration_us_total: self.wait_duration_us_total.load(Ordering::Relaxed),
            max_batch_size_observed: self.max_batch_size_observed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.submissions_total.store(0, Ordering::Relaxed);
        self.queries_submitted.store(0, Ordering::Relaxed);
        self.batches_dispatched.store(0, Ordering::Relaxed);
        self.queries_dispatched.store(0, Ordering::Relaxed);
        self.submissions_batched.store(0, Ordering::Relaxed);
        self.batches_failed.store(0, Ordering::Relaxed);
        self.flush_duration_us_total.store(0, Ordering::Relaxed);
        self.wait_duration_us_total.store(0, Ordering::Relaxed);
        self.max_batch_size_observed.store(0, Ordering::Relaxed);
    }
}

impl Default for CoalescerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of coalescer metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoalescerMetricsSnapshot {
    pub submissions_total: u64,
    pub queries_submitted: u64,
    pub batches_dispatched: u64,
    pub queries_dispatched: u64,
    pub submissions_batched: u64,
    pub batches_failed: u64,
    pub flush_duration_us_total: u64,
    pub wait_duration_us_total: u64,
    pub max_batch_size_observed: u64,
}

impl CoalescerMetricsSnapshot {
    /// Average queries per batch, or 0 if nothing was dispatched.
    #[must_use]
    pub fn avg_batch_size(&self) -> u64 {
        self.queries_dispatched
            .checked_div(self.batches_dispatched)
            .unwrap_or(0)
    }

    /// Round-trip reduction ratio: submissions batched per downstream call.
    ///
    /// Without coalescing, each submission costs its own round-trip; with
    /// coalescing, N submissions share one.
    #[must_use]
    pub fn round_trip_reduction_ratio(&self) -> u64 {
        self.submissions_batched
            .checked_div(self.batches_dispatched)
            .unwrap_or(0)
    }
}

impl std::fmt::Display for CoalescerMetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "submissions={} batches={} queries={} failed={} avg_batch={} \
             max_batch={} reduction={}x",
            self.submissions_total,
            self.batches_dispatched,
            self.queries_dispatched,
            self.batches_failed,
            self.avg_batch_size(),
            self.max_batch_size_observed,
            self.round_trip_reduction_ratio(),
        )
    }
}
