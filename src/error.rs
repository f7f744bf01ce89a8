//! Pipeline error taxonomy.
//!
//! Retryable failures are recovered internally and never appear here; the
//! variants below are the conditions a caller can actually observe.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("intake queue is full (capacity {capacity})")]
    IntakeFull { capacity: usize },

    #[error("pipeline is shut down")]
    PipelineClosed,

    #[error("retry budget exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("job executor panicked: {detail}")]
    ExecutorPanic { detail: String },
}

impl PipelineError {
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Marker error for failures that should be re-attempted.
///
/// The default retry classifier walks an executor error's chain and treats the
/// job as retryable iff this marker appears anywhere in it. Executors signal a
/// transient condition with `Err(TransientError::new("...").into())` or by
/// wrapping the marker with additional context.
#[derive(Debug, Error)]
#[error("transient job failure: {0}")]
pub struct TransientError(pub String);

impl TransientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
