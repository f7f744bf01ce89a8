//! Retry classification.
//!
//! The processor consults a [`RetryClassifier`] for every executor error:
//! retryable failures loop back through the batching stage, everything else is
//! terminal and lands on the error sink. The retry budget and backoff curve
//! live in [`crate::config::RetryConfig`].

use crate::error::TransientError;

/// Decides whether an executor error is worth another attempt.
pub trait RetryClassifier: Send + Sync {
    fn is_retryable(&self, error: &anyhow::Error) -> bool;
}

/// Closures over `&anyhow::Error` are accepted directly as classifiers.
impl<F> RetryClassifier for F
where
    F: Fn(&anyhow::Error) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &anyhow::Error) -> bool {
        self(error)
    }
}

/// Default classification: retryable iff the error chain carries a
/// [`TransientError`] marker. Context wrapping does not hide the marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRetryClassifier;

impl RetryClassifier for DefaultRetryClassifier {
    fn is_retryable(&self, error: &anyhow::Error) -> bool {
        error
            .chain()
            .any(|cause| cause.downcast_ref::<TransientError>().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn bare_marker_is_retryable() {
        let err = anyhow::Error::new(TransientError::new("connection reset"));
        assert!(DefaultRetryClassifier.is_retryable(&err));
    }

    #[test]
    fn wrapped_marker_is_still_retryable() {
        let err = anyhow::Error::new(TransientError::new("connection reset"))
            .context("while talking to upstream");
        assert!(DefaultRetryClassifier.is_retryable(&err));
    }

    #[test]
    fn unmarked_errors_are_terminal() {
        let err = anyhow!("schema validation failed");
        assert!(!DefaultRetryClassifier.is_retryable(&err));
    }

    #[test]
    fn closure_classifier_is_accepted() {
        let classifier = |error: &anyhow::Error| error.to_string().contains("busy");
        assert!(classifier.is_retryable(&anyhow!("resource busy")));
        assert!(!classifier.is_retryable(&anyhow!("not found")));
    }
}
