//! Downstream-executor doubles.
//!
//! Three behaviors cover the conformance suites: record-and-succeed,
//! fail-everything, and block-until-released. The gated executor turns the
//! "submissions arrive while a dispatch is in flight" races into
//! deterministic test steps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};

use batchq_core::BatchExecutor;
use batchq_error::{BatchError, Result};
use parking_lot::Mutex;

/// Records every batch it receives and always succeeds.
pub struct RecordingExecutor<Q> {
    batches: Mutex<Vec<Vec<Q>>>,
    calls: AtomicU64,
}

impl<Q> RecordingExecutor<Q> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of executor calls so far.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<Q: Clone> RecordingExecutor<Q> {
    /// Every batch received, in dispatch order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Q>> {
        self.batches.lock().clone()
    }

    /// All queries received, concatenated in dispatch order.
    #[must_use]
    pub fn flattened(&self) -> Vec<Q> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl<Q> Default for RecordingExecutor<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Clone + Send> BatchExecutor<Q> for RecordingExecutor<Q> {
    fn run_batch(&self, queries: &[Q]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.batches.lock().push(queries.to_vec());
        Ok(())
    }
}

/// Fails every batch with a fixed error.
pub struct FailingExecutor {
    error: BatchError,
    calls: AtomicU64,
}

impl FailingExecutor {
    /// Fail with the given error.
    #[must_use]
    pub fn new(error: BatchError) -> Self {
        Self {
            error,
            calls: AtomicU64::new(0),
        }
    }

    /// The error every call returns.
    #[must_use]
    pub const fn error(&self) -> &BatchError {
        &self.error
    }

    /// Number of executor calls so far.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for FailingExecutor {
    fn default() -> Self {
        Self::new(BatchError::executor("deliberate failure for every batch"))
    }
}

impl<Q> BatchExecutor<Q> for FailingExecutor
where
    Q: Send,
{
    fn run_batch(&self, _queries: &[Q]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(self.error.clone())
    }
}

/// Hands each batch to a rendezvous channel and blocks until the test side
/// receives it, then succeeds.
///
/// While the test has not yet called `recv` on the paired receiver, the
/// dispatch is pinned in flight, so the test can enqueue further
/// submissions and observe them coalesce into the next batch.
pub struct GatedExecutor<Q> {
    gate: SyncSender<Vec<Q>>,
}

impl<Q> GatedExecutor<Q> {
    /// Create the executor and the receiver that releases its batches.
    #[must_use]
    pub fn new() -> (Self, Receiver<Vec<Q>>) {
        let (gate, released) = sync_channel(0);
        (Self { gate }, released)
    }
}

impl<Q: Clone + Send> BatchExecutor<Q> for GatedExecutor<Q> {
    fn run_batch(&self, queries: &[Q]) -> Result<()> {
        self.gate
            .send(queries.to_vec())
            .map_err(|_| BatchError::internal("gate receiver dropped"))
    }
}
