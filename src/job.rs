//! Core job data model.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a job across retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A unit of work flowing through the pipeline.
///
/// The payload is opaque to the pipeline; ownership transfers at every queue
/// boundary. `attempts` counts completed executions, so a freshly submitted
/// job carries 0 and a job seen again after one retryable failure carries 1.
#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: JobId,
    pub payload: P,
    attempts: u32,
}

impl<P> Job<P> {
    pub fn new(payload: P) -> Self {
        Self {
            id: JobId::random(),
            payload,
            attempts: 0,
        }
    }

    pub fn with_id(id: impl Into<JobId>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}

/// A fixed-capacity, ordered group of jobs dispatched to the processor as a
/// unit.
pub type Batch<P> = Vec<Job<P>>;

/// Terminal-failure record surfaced on the error sink.
#[derive(Debug)]
pub struct FailedJob {
    pub job_id: JobId,
    pub attempts: u32,
    pub error: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_unique() {
        let a = Job::new(1u32);
        let b = Job::new(1u32);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn explicit_id_is_preserved() {
        let job = Job::with_id("order-17", "payload");
        assert_eq!(job.id.as_str(), "order-17");
        assert_eq!(job.id.to_string(), "order-17");
    }

    #[test]
    fn attempts_start_at_zero_and_accumulate() {
        let mut job = Job::new(());
        assert_eq!(job.attempts(), 0);
        job.record_attempt();
        job.record_attempt();
        assert_eq!(job.attempts(), 2);
    }
}
