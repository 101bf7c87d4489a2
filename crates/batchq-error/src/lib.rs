use thiserror::Error;

/// Primary error type for batchq operations.
///
/// One shared enum across the workspace: executor implementations produce the
/// downstream variants, and the coalescer delivers them to every submission in
/// the failed batch without wrapping. The enum is `Clone` because a single
/// batch outcome is fanned out to several blocked callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    // === Downstream errors ===
    /// The downstream executor rejected or failed a batch.
    #[error("batch execution failed: {detail}")]
    Executor { detail: String },

    /// The downstream backend could not be reached.
    #[error("backend unavailable: {detail}")]
    BackendUnavailable { detail: String },

    // === Configuration errors ===
    /// The batch size cap must be a positive integer.
    #[error("invalid batch size cap: {cap}")]
    InvalidCap { cap: usize },

    // === Internal errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Create an executor failure.
    pub fn executor(detail: impl Into<String>) -> Self {
        Self::Executor {
            detail: detail.into(),
        }
    }

    /// Create a backend-unavailable error.
    pub fn backend_unavailable(detail: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this is a transient error that may succeed on retry.
    ///
    /// The coalescer itself never retries; this is a hint for callers.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Result type alias using `BatchError`.
pub type Result<T> = std::result::Result<T, BatchError>;
