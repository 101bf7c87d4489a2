//! Test scaffolding for the batchq workspace.
//!
//! Reusable downstream-executor doubles for unit, integration, and
//! property suites. Kept in a library crate so every consumer tests the
//! coalescer against the same executors.

pub mod executors;

pub use executors::{FailingExecutor, GatedExecutor, RecordingExecutor};
