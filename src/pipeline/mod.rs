//! Concurrent job-batching pipeline.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────┐      ┌───────────┐
//!  submit ──────────▶│ Batcher  │─────▶│ Processor │────▶ error sink
//!            intake  └──────────┘ batch└───────────┘
//!              ▲                             │ retryable
//!              │        ┌───────────┐        │
//!              └────────│   Relay   │◀───────┘
//!                       └───────────┘
//! ```
//!
//! Every stage is an independent tokio task; stages communicate only through
//! bounded channels, and every blocking send or receive races the shared
//! [`CancellationToken`]. Retries re-enter the batching stage through a
//! dedicated fan-in relay so the processor and the batcher can never hold a
//! circular wait on one bounded queue.
//!
//! ## Lifecycle
//!
//! `Active → Cancelling → Terminated`, monotonic. Cancellation comes from the
//! configured deadline, from [`PipelineHandle::shutdown`], from an external
//! parent token, or from dropping the handle. The supervisor publishes
//! `Terminated` only after every stage task has exited, so
//! [`PipelineHandle::done`] is a reliable leak check.

pub(crate) mod batcher;
pub(crate) mod processor;
pub(crate) mod relay;
pub mod stats;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, SubmitPolicy};
use crate::error::{PipelineError, Result};
use crate::executor::JobExecutor;
use crate::job::{FailedJob, Job};
use crate::retry::{DefaultRetryClassifier, RetryClassifier};

use batcher::run_batcher;
use processor::run_processor;
use relay::run_relay;
use stats::{PipelineStats, StatsSnapshot};

/// Observable lifecycle of a pipeline instance. Transitions are monotonic;
/// `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Cancelling,
    Terminated,
}

/// What happened to a submitted job at the intake boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Enqueued,
    /// Discarded under [`SubmitPolicy::Drop`] because the intake was full.
    Dropped,
}

/// A configured, not-yet-running pipeline.
pub struct Pipeline<P> {
    config: PipelineConfig,
    executor: Arc<dyn JobExecutor<P>>,
    classifier: Arc<dyn RetryClassifier>,
}

impl<P> Pipeline<P>
where
    P: Send + Sync + 'static,
{
    /// Validates the configuration and binds the executor. The default retry
    /// classifier looks for the [`crate::error::TransientError`] marker.
    pub fn new(config: PipelineConfig, executor: impl JobExecutor<P> + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            executor: Arc::new(executor),
            classifier: Arc::new(DefaultRetryClassifier),
        })
    }

    /// Replace the retry classifier.
    pub fn with_classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Spawn all stages with a fresh cancellation token.
    pub fn start(self) -> PipelineHandle<P> {
        let token = CancellationToken::new();
        self.spawn_stages(token)
    }

    /// Spawn all stages under a caller-owned token. The pipeline cancels with
    /// the parent but cancelling the pipeline does not touch the parent.
    pub fn start_with_token(self, parent: &CancellationToken) -> PipelineHandle<P> {
        self.spawn_stages(parent.child_token())
    }

    fn spawn_stages(self, token: CancellationToken) -> PipelineHandle<P> {
        let config = self.config;
        let stats = Arc::new(PipelineStats::default());

        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity);
        let (batch_tx, batch_rx) = mpsc::channel(config.batch_queue_capacity);
        let (retry_tx, retry_rx) = mpsc::channel(config.intake_capacity);
        let (error_tx, error_rx) = mpsc::channel(config.error_capacity);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Active);

        let mut stages = JoinSet::new();
        stages.spawn(run_batcher(
            intake_rx,
            batch_tx,
            config.batch_size,
            config.flush_partial_on_shutdown,
            token.clone(),
            stats.clone(),
        ));
        stages.spawn(run_processor(
            batch_rx,
            retry_tx,
            error_tx,
            self.executor,
            self.classifier,
            config.retry.clone(),
            token.clone(),
            stats.clone(),
        ));
        stages.spawn(run_relay(retry_rx, intake_tx.clone(), token.clone()));

        if let Some(deadline) = config.deadline() {
            let deadline_token = token.clone();
            stages.spawn(async move {
                tokio::select! {
                    _ = deadline_token.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        info!(deadline_ms = deadline.as_millis() as u64, "deadline expired, cancelling pipeline");
                        deadline_token.cancel();
                    }
                }
            });
        }

        let supervisor_token = token.clone();
        tokio::spawn(supervise(stages, supervisor_token, state_tx));

        info!(
            batch_size = config.batch_size,
            intake_capacity = config.intake_capacity,
            deadline_ms = config.deadline_ms,
            "pipeline started"
        );

        PipelineHandle {
            intake: intake_tx,
            errors: Some(error_rx),
            token,
            state_rx,
            stats,
            config,
        }
    }
}

/// Joins every stage task and only then publishes `Terminated`. A stage that
/// exits abnormally brings the rest of the pipeline down.
async fn supervise(
    mut stages: JoinSet<()>,
    token: CancellationToken,
    state_tx: watch::Sender<LifecycleState>,
) {
    let mut cancel_observed = false;
    loop {
        tokio::select! {
            _ = token.cancelled(), if !cancel_observed => {
                cancel_observed = true;
                info!("pipeline cancelling");
                let _ = state_tx.send(LifecycleState::Cancelling);
            }
            joined = stages.join_next() => match joined {
                Some(Ok(())) => {}
                Some(Err(join_error)) => {
                    if join_error.is_panic() {
                        error!(%join_error, "pipeline stage panicked, cancelling remaining stages");
                    }
                    token.cancel();
                }
                None => break,
            },
        }
    }
    let _ = state_tx.send(LifecycleState::Terminated);
    info!("pipeline terminated");
}

/// Handle to a running pipeline: submission, observation, and shutdown.
///
/// Dropping the handle cancels the pipeline.
pub struct PipelineHandle<P> {
    intake: mpsc::Sender<Job<P>>,
    errors: Option<mpsc::Receiver<FailedJob>>,
    token: CancellationToken,
    state_rx: watch::Receiver<LifecycleState>,
    stats: Arc<PipelineStats>,
    config: PipelineConfig,
}

impl<P> PipelineHandle<P>
where
    P: Send + Sync + 'static,
{
    /// Submit a payload as a new job. Backpressure behavior follows the
    /// configured [`SubmitPolicy`]; a drop is reported in the outcome and the
    /// counters, never swallowed.
    pub async fn submit(&self, payload: P) -> Result<SubmitOutcome> {
        self.submit_job(Job::new(payload)).await
    }

    /// Submit a caller-constructed job (stable ids across systems).
    pub async fn submit_job(&self, job: Job<P>) -> Result<SubmitOutcome> {
        if self.token.is_cancelled() {
            return Err(PipelineError::PipelineClosed);
        }

        match self.config.submit_policy {
            SubmitPolicy::Block => match self.intake.send(job).await {
                Ok(()) => self.enqueued(),
                Err(_) => Err(PipelineError::PipelineClosed),
            },
            SubmitPolicy::Drop => match self.intake.try_send(job) {
                Ok(()) => self.enqueued(),
                Err(mpsc::error::TrySendError::Full(job)) => {
                    warn!(job_id = %job.id, "intake full, dropping job");
                    PipelineStats::incr(&self.stats.jobs_dropped);
                    Ok(SubmitOutcome::Dropped)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineError::PipelineClosed),
            },
            SubmitPolicy::Reject => match self.intake.try_send(job) {
                Ok(()) => self.enqueued(),
                Err(mpsc::error::TrySendError::Full(_)) => Err(PipelineError::IntakeFull {
                    capacity: self.config.intake_capacity,
                }),
                Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineError::PipelineClosed),
            },
        }
    }

    /// Submit a sequence of payloads, returning how many were enqueued.
    pub async fn submit_all(&self, payloads: impl IntoIterator<Item = P>) -> Result<usize> {
        let mut enqueued = 0;
        for payload in payloads {
            if self.submit(payload).await? == SubmitOutcome::Enqueued {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    fn enqueued(&self) -> Result<SubmitOutcome> {
        PipelineStats::incr(&self.stats.jobs_submitted);
        Ok(SubmitOutcome::Enqueued)
    }

    /// Take the terminal-failure sink. Yields one [`FailedJob`] per terminal
    /// failure; retryable failures never appear here.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<FailedJob>> {
        self.errors.take()
    }

    /// Resolves once every stage has exited and the pipeline is `Terminated`.
    pub async fn done(&self) {
        let mut state = self.state_rx.clone();
        let _ = state
            .wait_for(|state| *state == LifecycleState::Terminated)
            .await;
    }

    /// Cancel the pipeline and wait for termination. Idempotent.
    pub async fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("pipeline shutdown requested");
            self.token.cancel();
        }
        self.done().await;
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl<P> Drop for PipelineHandle<P> {
    fn drop(&mut self) {
        if !self.token.is_cancelled() {
            debug!("pipeline handle dropped, cancelling");
            self.token.cancel();
        }
    }
}
