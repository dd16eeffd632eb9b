//! Error types for wknn.
//!
//! Every variant is terminal for a batch run: nothing in the crate retries or
//! skips past one of these, it is propagated to the caller with `?`.

use thiserror::Error;

/// Errors that can occur while loading data, learning weights or classifying.
#[derive(Debug, Error)]
pub enum KnnError {
    /// Instance records could not be found within the missing-index budget.
    #[error("data unavailable: no record for {key} within a budget of {budget} missing instances")]
    DataUnavailable { key: String, budget: usize },

    /// A token is neither the missing marker nor a finite number.
    #[error("cannot parse token {token:?} at position {position}: {reason}")]
    Parse {
        token: String,
        position: usize,
        reason: String,
    },

    /// A feature weight left the strictly positive range the learner relies on.
    #[error("invariant violation: weight of feature {feature} is {weight}")]
    InvariantViolation { feature: usize, weight: f64 },

    /// Configuration or pool sizes are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A vector does not have the configured number of features.
    #[error("dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The distance worker pool could not be created.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// I/O error (feature files, weight records, traces).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON for [`crate::Config`].
    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rayon::ThreadPoolBuildError> for KnnError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(e.to_string())
    }
}

/// Result type for wknn operations.
pub type Result<T> = std::result::Result<T, KnnError>;
