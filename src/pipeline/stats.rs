//! Pipeline counters.
//!
//! Lock-free counters shared by every stage. Cancellation-induced exits do not
//! touch the failure counters, so an always-zero `jobs_failed` alongside a
//! cancelled run reads as a clean shutdown rather than an error.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub(crate) jobs_submitted: AtomicU64,
    pub(crate) jobs_dropped: AtomicU64,
    pub(crate) batches_emitted: AtomicU64,
    pub(crate) jobs_succeeded: AtomicU64,
    pub(crate) jobs_retried: AtomicU64,
    pub(crate) jobs_failed: AtomicU64,
    pub(crate) retries_exhausted: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_dropped: self.jobs_dropped.load(Ordering::Relaxed),
            batches_emitted: self.batches_emitted.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_retried: self.jobs_retried.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            captured_at: Utc::now(),
        }
    }
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Jobs accepted through `submit`.
    pub jobs_submitted: u64,
    /// Jobs discarded by the `Drop` submit policy.
    pub jobs_dropped: u64,
    /// Batches handed to the processor.
    pub batches_emitted: u64,
    /// Jobs that completed successfully.
    pub jobs_succeeded: u64,
    /// Retryable failures re-injected into the batching stage.
    pub jobs_retried: u64,
    /// Terminal failures surfaced on the error sink.
    pub jobs_failed: u64,
    /// Jobs whose retry budget ran out.
    pub retries_exhausted: u64,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_updates() {
        let stats = PipelineStats::default();
        PipelineStats::incr(&stats.jobs_submitted);
        PipelineStats::incr(&stats.jobs_submitted);
        PipelineStats::incr(&stats.jobs_succeeded);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.jobs_succeeded, 1);
        assert_eq!(snapshot.jobs_failed, 0);
    }
}
