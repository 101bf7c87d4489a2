//! Query coalescing for a batch-capable downstream executor.
//!
//! Concurrent callers submit ordered query sequences; the coalescer merges
//! them into fewer downstream calls and reports each caller the outcome of
//! the batch its queries were placed in.

pub mod coalescer;
pub mod config;
pub mod metrics;
mod pending;
mod waiter;

pub use coalescer::{BatchCoalescer, BatchExecutor, FlushState};
pub use config::{CoalescerConfig, DEFAULT_MAX_BATCH_SIZE};
pub use metrics::{CoalescerMetrics, CoalescerMetricsSnapshot};
