//! Coalescer configuration.

use batchq_error::{BatchError, Result};

/// Default maximum number of queries per downstream call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Configuration for the batch coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Maximum number of queries per downstream call. A pending buffer
    /// larger than this is carved into several consecutive batches.
    ///
    /// Must be positive; zero is rejected at construction time.
    pub max_batch_size: usize,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl CoalescerConfig {
    /// Create a configuration with the given batch size cap.
    #[must_use]
    pub const fn new(max_batch_size: usize) -> Self {
        Self { max_batch_size }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidCap`] if `max_batch_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::InvalidCap { cap: 0 });
        }
        Ok(())
    }
}
