//! FIFO pending buffer and batch carving.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::waiter::Waiter;

/// Queries accumulated since the last carve, each tagged with its owning
/// submission's outcome slot. Mutated only under the coalescer's state lock.
pub(crate) struct PendingBuffer<Q> {
    entries: VecDeque<PendingEntry<Q>>,
}

struct PendingEntry<Q> {
    query: Q,
    waiter: Arc<Waiter>,
}

/// A prefix of the pending buffer carved off for one downstream call.
///
/// Ownership of the queries transfers to the dispatching thread; the buffer
/// retains only the overflow beyond the cap.
pub(crate) struct CarvedBatch<Q> {
    /// Queries in arrival order, at most `cap` of them.
    pub(crate) queries: Vec<Q>,
    /// Each covered submission's slot with the number of its queries in this
    /// batch, in arrival order. A submission spanning the carve boundary
    /// appears here with partial coverage and again in a later batch.
    pub(crate) coverage: Vec<(Arc<Waiter>, usize)>,
}

impl<Q> PendingBuffer<Q> {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one submission's queries, all owned by `waiter`.
    pub(crate) fn append(&mut self, queries: Vec<Q>, waiter: &Arc<Waiter>) {
        self.entries.reserve(queries.len());
        for query in queries {
            self.entries.push_back(PendingEntry {
                query,
                waiter: Arc::clone(waiter),
            });
        }
    }

    /// Carve off the oldest `cap` queries as the next batch.
    pub(crate) fn carve(&mut self, cap: usize) -> CarvedBatch<Q> {
        debug_assert!(cap > 0, "carve with zero cap");
        let take = cap.min(self.entries.len());
        let mut queries = Vec::with_capacity(take);
        let mut coverage: Vec<(Arc<Waiter>, usize)> = Vec::new();

        for _ in 0..take {
            let entry = self.entries.pop_front().expect("take <= len");
            queries.push(entry.query);
            match coverage.last_mut() {
                Some((waiter, count)) if Arc::ptr_eq(waiter, &entry.waiter) => *count += 1,
                _ => coverage.push((entry.waiter, 1)),
            }
        }

        CarvedBatch { queries, coverage }
    }
}
