//! Batch coalescing coordinator.
//!
//! Amortizes round-trips to a slow, batch-capable executor by merging
//! concurrently submitted queries into consolidated downstream calls.
//!
//! # Dispatch Protocol
//!
//! There is no background thread. Every submission appends its queries to
//! the pending buffer under one exclusion lock and then checks the flush
//! state:
//!
//! ```text
//! IDLE ──▶ DISPATCHING ──▶ IDLE
//! ```
//!
//! - **IDLE**: the first submission to observe this state becomes the
//!   dispatcher for the cycle. It carves the oldest `max_batch_size`
//!   queries off the buffer, releases the lock, and calls the executor.
//! - **DISPATCHING**: a downstream call is in flight. Arriving submissions
//!   extend the buffer and park on their own outcome slot.
//!
//! When the executor returns, the dispatcher re-acquires the lock, delivers
//! the single outcome to every slot covered by that batch, and, if the
//! buffer is non-empty, carves the next batch and dispatches again before
//! going idle. The buffer fully drains without requiring a new caller to
//! arrive, and queries left over beyond the cap form the very next batch.
//!
//! The lock is never held across the executor call, so a slow batch never
//! blocks new arrivals from enqueueing.

use std::sync::Arc;
use std::time::Instant;

use batchq_error::Result;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::CoalescerConfig;
use crate::metrics::CoalescerMetrics;
use crate::pending::PendingBuffer;
use crate::waiter::Waiter;

/// Downstream executor capability.
///
/// One call takes an ordered batch of queries and returns a single outcome
/// covering the whole batch. The coalescer treats the call as blocking and
/// imposes no timeout or retry of its own; a failing call's error reaches
/// every submission in that batch verbatim, and the batch is discarded.
pub trait BatchExecutor<Q>: Send + Sync {
    /// Execute one ordered batch.
    ///
    /// # Errors
    ///
    /// Any error returned here is delivered unmodified to every submission
    /// whose queries were part of this batch.
    fn run_batch(&self, queries: &[Q]) -> Result<()>;
}

impl<Q, E: BatchExecutor<Q>> BatchExecutor<Q> for &E {
    fn run_batch(&self, queries: &[Q]) -> Result<()> {
        (**self).run_batch(queries)
    }
}

impl<Q, E: BatchExecutor<Q> + ?Sized> BatchExecutor<Q> for Arc<E> {
    fn run_batch(&self, queries: &[Q]) -> Result<()> {
        (**self).run_batch(queries)
    }
}

/// Dispatch state of the coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// No downstream call in flight. The next submission becomes the
    /// dispatcher.
    Idle,
    /// A dispatcher thread is inside the downstream executor.
    Dispatching,
}

struct CoalescerState<Q> {
    pending: PendingBuffer<Q>,
    flush: FlushState,
}

/// Coalesces concurrent submissions into consolidated executor calls.
///
/// Safe to share across arbitrarily many threads behind an [`Arc`]; all
/// coordination happens through one internal exclusion lock held only for
/// short bookkeeping operations.
pub struct BatchCoalescer<Q, E> {
    executor: E,
    config: CoalescerConfig,
    state: Mutex<CoalescerState<Q>>,
    metrics: CoalescerMetrics,
}

impl<Q, E> BatchCoalescer<Q, E>
where
    Q: Send,
    E: BatchExecutor<Q>,
{
    /// Create a coalescer with the given batch size cap.
    ///
    /// # Errors
    ///
    /// Returns [`batchq_error::BatchError::InvalidCap`] if the cap is zero.
    pub fn new(executor: E, max_batch_size: usize) -> Result<Self> {
        Self::with_config(executor, CoalescerConfig::new(max_batch_size))
    }

    /// Create a coalescer from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`batchq_error::BatchError::InvalidCap`] if the configured
    /// cap is zero.
    pub fn with_config(executor: E, config: CoalescerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            config,
            state: Mutex::new(CoalescerState {
                pending: PendingBuffer::new(),
                flush: FlushState::Idle,
            }),
            metrics: CoalescerMetrics::new(),
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> CoalescerConfig {
        self.config
    }

    /// Instance metrics.
    #[must_use]
    pub const fn metrics(&self) -> &CoalescerMetrics {
        &self.metrics
    }

    /// Number of queries currently waiting for a batch (diagnostics).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Current flush state (diagnostics).
    #[must_use]
    pub fn flush_state(&self) -> FlushState {
        self.state.lock().flush
    }

    /// Submit an ordered sequence of queries and block until the batch (or
    /// batches) containing them completes.
    ///
    /// An empty submission is a no-op success: no slot is created and the
    /// executor is never invoked.
    ///
    /// The returned outcome is exactly the outcome of the downstream call
    /// this submission was placed into, even when that call also carried
    /// other callers' queries. A submission larger than the cap spans
    /// consecutive batches and resolves to the first error seen, or success
    /// if every spanned batch succeeded.
    ///
    /// # Errors
    ///
    /// Whatever error the downstream executor returned for this
    /// submission's batch, unmodified.
    pub fn submit(&self, queries: Vec<Q>) -> Result<()> {
        if queries.is_empty() {
            trace!(target: "batchq::coalescer", "empty submission, nothing to do");
            return Ok(());
        }

        let query_count = queries.len();
        let waiter = Arc::new(Waiter::new(query_count));

        let mut state = self.state.lock();
        state.pending.append(queries, &waiter);
        self.metrics.record_submission(as_u64(query_count));
        trace!(
            target: "batchq::coalescer",
            query_count,
            pending = state.pending.len(),
            flush = ?state.flush,
            "submission enqueued"
        );

        // First submission to observe IDLE becomes the dispatcher and keeps
        // dispatching until the buffer drains. Everyone else parks below.
        while state.flush == FlushState::Idle && !state.pending.is_empty() {
            state.flush = FlushState::Dispatching;
            let batch = state.pending.carve(self.config.max_batch_size);
            debug!(
                target: "batchq::coalescer",
                batch_size = batch.queries.len(),
                submissions = batch.coverage.len(),
                overflow = state.pending.len(),
                "dispatching batch"
            );
            drop(state);

            let flush_started = Instant::now();
            let outcome = self.executor.run_batch(&batch.queries);
            let flush_us = elapsed_us(flush_started);

            state = self.state.lock();
            state.flush = FlushState::Idle;
            for (slot, covered) in &batch.coverage {
                slot.absorb(*covered, &outcome);
            }
            self.metrics.record_flush(
                as_u64(batch.queries.len()),
                as_u64(batch.coverage.len()),
                flush_us,
                outcome.is_err(),
            );
            match &outcome {
                Ok(()) => info!(
                    target: "batchq::coalescer",
                    batch_size = batch.queries.len(),
                    flush_us,
                    "batch complete"
                ),
                Err(error) => info!(
                    target: "batchq::coalescer",
                    batch_size = batch.queries.len(),
                    flush_us,
                    %error,
                    "batch failed"
                ),
            }
        }
        drop(state);

        let wait_started = Instant::now();
        let outcome = waiter.wait();
        self.metrics.record_wait(elapsed_us(wait_started));
        outcome
    }
}

impl<Q, E> std::fmt::Debug for BatchCoalescer<Q, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BatchCoalescer")
            .field("max_batch_size", &self.config.max_batch_size)
            .field("pending", &state.pending.len())
            .field("flush", &state.flush)
            .finish_non_exhaustive()
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use batchq_error::BatchError;

    use super::*;

    /// Appends every batch it receives to a shared log; always succeeds.
    #[derive(Default)]
    struct LogExecutor {
        batches: Mutex<Vec<Vec<String>>>,
        calls: AtomicU64,
    }

    impl LogExecutor {
        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().clone()
        }
    }

    impl BatchExecutor<String> for LogExecutor {
        fn run_batch(&self, queries: &[String]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.batches.lock().push(queries.to_vec());
            Ok(())
        }
    }

    struct AlwaysFail;

    impl BatchExecutor<String> for AlwaysFail {
        fn run_batch(&self, _queries: &[String]) -> Result<()> {
            Err(BatchError::executor("deliberate failure"))
        }
    }

    fn q(s: &str) -> String {
        s.to_owned()
    }

    #[test]
    fn zero_cap_rejected_at_construction() {
        let log = LogExecutor::default();
        assert_eq!(
            BatchCoalescer::<String, _>::new(&log, 0).unwrap_err(),
            BatchError::InvalidCap { cap: 0 }
        );
        assert_eq!(
            BatchCoalescer::<String, _>::with_config(&log, CoalescerConfig::new(0)).unwrap_err(),
            BatchError::InvalidCap { cap: 0 }
        );
    }

    #[test]
    fn empty_submission_is_noop_success() {
        let log = LogExecutor::default();
        let coalescer = BatchCoalescer::new(&log, 3).unwrap();

        coalescer.submit(Vec::<String>::new()).unwrap();

        assert_eq!(log.calls.load(Ordering::Relaxed), 0);
        assert_eq!(coalescer.pending_len(), 0);
        assert_eq!(coalescer.metrics().snapshot().submissions_total, 0);
    }

    #[test]
    fn single_submission_dispatches_in_order() {
        let log = LogExecutor::default();
        let coalescer = BatchCoalescer::new(&log, 8).unwrap();

        coalescer.submit(vec![q("a"), q("b"), q("c")]).unwrap();

        assert_eq!(log.batches(), vec![vec![q("a"), q("b"), q("c")]]);
        assert_eq!(coalescer.flush_state(), FlushState::Idle);
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[test]
    fn oversized_burst_chunks_at_the_cap() {
        // One burst of 5 with cap 2: batches of 2, 2, then 1.
        let log = LogExecutor::default();
        let coalescer = BatchCoalescer::new(&log, 2).unwrap();

        coalescer
            .submit(vec![q("1"), q("2"), q("3"), q("4"), q("5")])
            .unwrap();

        assert_eq!(
            log.batches(),
            vec![
                vec![q("1"), q("2")],
                vec![q("3"), q("4")],
                vec![q("5")],
            ]
        );
    }

    #[test]
    fn executor_error_reaches_the_submitter() {
        let coalescer = BatchCoalescer::new(AlwaysFail, 3).unwrap();
        assert_eq!(
            coalescer.submit(vec![q("x")]).unwrap_err(),
            BatchError::executor("deliberate failure")
        );
        assert_eq!(coalescer.flush_state(), FlushState::Idle);
        assert_eq!(coalescer.pending_len(), 0, "failed batch is discarded");
    }

    #[test]
    fn failed_chunk_does_not_stop_the_drain() {
        // Fails the first call only; the rest of the burst still dispatches.
        struct FailFirst {
            calls: AtomicU64,
            seen: Mutex<Vec<usize>>,
        }

        impl BatchExecutor<String> for FailFirst {
            fn run_batch(&self, queries: &[String]) -> Result<()> {
                self.seen.lock().push(queries.len());
                if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                    return Err(BatchError::executor("first chunk fails"));
                }
                Ok(())
            }
        }

        let exec = FailFirst {
            calls: AtomicU64::new(0),
            seen: Mutex::new(Vec::new()),
        };
        let coalescer = BatchCoalescer::new(&exec, 2).unwrap();

        // Spans three batches; the first fails, so the submission does too.
        let outcome = coalescer.submit(vec![q("1"), q("2"), q("3"), q("4"), q("5")]);
        assert_eq!(
            outcome.unwrap_err(),
            BatchError::executor("first chunk fails")
        );

        // All chunks were still dispatched and the buffer drained.
        assert_eq!(*exec.seen.lock(), vec![2, 2, 1]);
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[test]
    fn metrics_account_for_flushes() {
        let log = LogExecutor::default();
        let coalescer = BatchCoalescer::new(&log, 2).unwrap();

        coalescer.submit(vec![q("1"), q("2"), q("3")]).unwrap();

        let snap = coalescer.metrics().snapshot();
        assert_eq!(snap.submissions_total, 1);
        assert_eq!(snap.queries_submitted, 3);
        assert_eq!(snap.batches_dispatched, 2);
        assert_eq!(snap.queries_dispatched, 3);
        assert_eq!(snap.batches_failed, 0);
        assert_eq!(snap.max_batch_size_observed, 2);
    }

    #[test]
    fn debug_format_shows_state() {
        let log = LogExecutor::default();
        let coalescer = BatchCoalescer::<String, _>::new(&log, 4).unwrap();
        let dbg = format!("{coalescer:?}");
        assert!(dbg.contains("BatchCoalescer"));
        assert!(dbg.contains("Idle"));
    }
}
