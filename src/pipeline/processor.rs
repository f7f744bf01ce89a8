//! Batch execution stage.
//!
//! Pulls batches, runs every job in accumulation order through the executor,
//! and routes each outcome: success is dropped, a retryable failure within
//! budget goes to the retry relay, everything else lands on the error sink.
//! The two failure routes are mutually exclusive by construction.
//!
//! Retries are never sent into the batcher's intake from here. They go to a
//! dedicated relay channel, so this stage cannot form a circular wait with the
//! batcher even when both queues are full.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::stats::PipelineStats;
use crate::config::RetryConfig;
use crate::error::PipelineError;
use crate::executor::JobExecutor;
use crate::job::{Batch, FailedJob, Job};
use crate::retry::RetryClassifier;

/// A job travelling back to the batching stage, with the backoff delay the
/// relay should serve before re-injecting it.
pub(crate) struct RetryEnvelope<P> {
    pub(crate) job: Job<P>,
    pub(crate) delay: Duration,
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_processor<P>(
    mut batches: mpsc::Receiver<Batch<P>>,
    retries: mpsc::Sender<RetryEnvelope<P>>,
    errors: mpsc::Sender<FailedJob>,
    executor: Arc<dyn JobExecutor<P>>,
    classifier: Arc<dyn RetryClassifier>,
    retry_config: RetryConfig,
    token: CancellationToken,
    stats: Arc<PipelineStats>,
) where
    P: Send + Sync + 'static,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("processor stopping on cancellation");
                return;
            }
            received = batches.recv() => match received {
                Some(batch) => {
                    if !process_batch(
                        batch,
                        &retries,
                        &errors,
                        &executor,
                        &classifier,
                        &retry_config,
                        &token,
                        &stats,
                    )
                    .await
                    {
                        debug!("processor stopping on cancellation");
                        return;
                    }
                }
                None => {
                    debug!("batch queue closed, processor stopping");
                    return;
                }
            }
        }
    }
}

/// Processes one batch in order. Returns `false` when cancellation interrupted
/// the batch and the stage should exit.
#[allow(clippy::too_many_arguments)]
async fn process_batch<P>(
    batch: Batch<P>,
    retries: &mpsc::Sender<RetryEnvelope<P>>,
    errors: &mpsc::Sender<FailedJob>,
    executor: &Arc<dyn JobExecutor<P>>,
    classifier: &Arc<dyn RetryClassifier>,
    retry_config: &RetryConfig,
    token: &CancellationToken,
    stats: &PipelineStats,
) -> bool
where
    P: Send + Sync + 'static,
{
    for mut job in batch {
        let outcome = match run_isolated(executor.as_ref(), &job, token).await {
            Some(outcome) => outcome,
            None => {
                debug!(job_id = %job.id, "cancellation during job execution");
                return false;
            }
        };

        match outcome {
            Ok(()) => {
                PipelineStats::incr(&stats.jobs_succeeded);
                debug!(job_id = %job.id, attempts = job.attempts() + 1, "job completed");
            }
            Err(error) if classifier.is_retryable(&error) => {
                job.record_attempt();
                if retry_config.attempts_remaining(job.attempts()) {
                    let delay = retry_config.delay_for(job.attempts());
                    debug!(
                        job_id = %job.id,
                        attempts = job.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "scheduling retry"
                    );
                    PipelineStats::incr(&stats.jobs_retried);
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(job_id = %job.id, "cancellation while handing off retry");
                            return false;
                        }
                        permit = retries.reserve() => {
                            match permit {
                                Ok(permit) => {
                                    permit.send(RetryEnvelope { job, delay });
                                }
                                Err(_) => {
                                    warn!("retry relay gone, processor stopping");
                                    return false;
                                }
                            }
                        }
                    }
                } else {
                    let attempts = job.attempts();
                    warn!(job_id = %job.id, attempts, "retry budget exhausted");
                    PipelineStats::incr(&stats.retries_exhausted);
                    let failed = FailedJob {
                        job_id: job.id,
                        attempts,
                        error: PipelineError::RetriesExhausted {
                            attempts,
                            source: error,
                        }
                        .into(),
                    };
                    if !deliver_failure(failed, errors, token).await {
                        return false;
                    }
                }
            }
            Err(error) => {
                job.record_attempt();
                let attempts = job.attempts();
                warn!(job_id = %job.id, error = %error, "job failed terminally");
                PipelineStats::incr(&stats.jobs_failed);
                let failed = FailedJob {
                    job_id: job.id,
                    attempts,
                    error,
                };
                if !deliver_failure(failed, errors, token).await {
                    return false;
                }
            }
        }
    }
    true
}

/// Runs the executor with panic isolation, racing cancellation. `None` means
/// cancellation won and the in-flight attempt was dropped.
async fn run_isolated<P>(
    executor: &dyn JobExecutor<P>,
    job: &Job<P>,
    token: &CancellationToken,
) -> Option<anyhow::Result<()>>
where
    P: Send + Sync + 'static,
{
    let guarded = AssertUnwindSafe(executor.run(job)).catch_unwind();
    tokio::select! {
        _ = token.cancelled() => None,
        outcome = guarded => Some(match outcome {
            Ok(result) => result,
            Err(panic) => Err(panic_to_error(panic)),
        }),
    }
}

fn panic_to_error(panic: Box<dyn std::any::Any + Send>) -> anyhow::Error {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string());
    PipelineError::ExecutorPanic { detail }.into()
}

/// Pushes a terminal failure to the error sink, racing cancellation. A caller
/// that dropped the sink receiver loses the record but does not stop the
/// pipeline.
async fn deliver_failure(
    failed: FailedJob,
    errors: &mpsc::Sender<FailedJob>,
    token: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => {
            debug!("cancellation while reporting terminal failure");
            false
        }
        sent = errors.send(failed) => {
            if sent.is_err() {
                debug!("error sink receiver dropped, discarding failure record");
            }
            true
        }
    }
}
