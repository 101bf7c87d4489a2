//! Per-submission outcome slots.
//!
//! A [`Waiter`] is a single-assignment signal: the dispatcher that completes
//! the batch (or batches) covering a submission's queries resolves it exactly
//! once, and the submitting thread blocks on it until then. When a submission
//! spans several batches, the slot resolves only after the last covering
//! batch completes, to the first error seen across them.
//!
//! Lock order: the coalescer state lock is taken before a waiter's slot lock
//! (`absorb` runs under both); `wait` takes only the slot lock.

use batchq_error::{BatchError, Result};
use parking_lot::{Condvar, Mutex};

/// Outcome slot for one submission.
pub(crate) struct Waiter {
    slot: Mutex<Slot>,
    resolved: Condvar,
}

struct Slot {
    /// Queries not yet covered by a completed batch.
    remaining: usize,
    /// First error observed across the batches this submission spanned.
    first_error: Option<BatchError>,
    done: bool,
}

impl Waiter {
    /// Create a slot covering `query_count` queries.
    pub(crate) fn new(query_count: usize) -> Self {
        debug_assert!(query_count > 0, "empty submissions never get a waiter");
        Self {
            slot: Mutex::new(Slot {
                remaining: query_count,
                first_error: None,
                done: false,
            }),
            resolved: Condvar::new(),
        }
    }

    /// Credit `covered` queries against this slot with the covering batch's
    /// outcome. Resolves the slot once every query has been covered.
    pub(crate) fn absorb(&self, covered: usize, outcome: &Result<()>) {
        let mut slot = self.slot.lock();
        debug_assert!(!slot.done, "absorb after resolution");
        debug_assert!(covered <= slot.remaining, "over-coverage");
        slot.remaining -= covered;
        if slot.first_error.is_none() {
            if let Err(error) = outcome {
                slot.first_error = Some(error.clone());
            }
        }
        if slot.remaining == 0 {
            slot.done = true;
            self.resolved.notify_all();
        }
    }

    /// Block until the slot resolves, then return its outcome.
    pub(crate) fn wait(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        while !slot.done {
            self.resolved.wait(&mut slot);
        }
        match &slot.first_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
