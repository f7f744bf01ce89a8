//! # jobflow
//!
//! Concurrent job-batching pipeline with a retry feedback loop and cooperative
//! cancellation.
//!
//! ## Overview
//!
//! The pipeline accepts a stream of discrete jobs, accumulates them into
//! fixed-size batches, executes each job through a caller-supplied
//! [`JobExecutor`], and routes failed-but-retryable jobs back into the
//! batching stage instead of discarding them. Terminal failures surface on an
//! error sink tagged with the job id; retryable failures are recovered
//! internally and never reach the caller.
//!
//! Shutdown is cooperative: a deadline, an explicit [`PipelineHandle::shutdown`],
//! or an external parent token cancels a shared [`tokio_util::sync::CancellationToken`]
//! that every stage races at every blocking point. The completion signal fires
//! only once every stage task has exited: no leaked tasks, no double-closed
//! queues.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jobflow::{Job, Pipeline, PipelineConfig, TransientError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig {
//!     batch_size: 5,
//!     ..PipelineConfig::default()
//! };
//!
//! let pipeline = Pipeline::new(config, |job: Job<String>| async move {
//!     if job.payload.contains("flaky") {
//!         Err(TransientError::new("upstream busy").into())
//!     } else {
//!         Ok(())
//!     }
//! })?;
//!
//! let mut handle = pipeline.start();
//! let mut failures = handle.take_errors().expect("error sink");
//!
//! handle.submit("order-1".to_string()).await?;
//! handle.submit("flaky-order-2".to_string()).await?;
//!
//! if let Some(failed) = failures.recv().await {
//!     eprintln!("job {} failed after {} attempts", failed.job_id, failed.attempts);
//! }
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`pipeline`] - stage tasks, lifecycle controller, and the public handle
//! - [`config`] - configuration structs, validation, and file/env loading
//! - [`executor`] - the pluggable execution seam
//! - [`retry`] - retry classification
//! - [`job`] - job, batch, and failure records
//! - [`error`] - error taxonomy
//! - [`logging`] - tracing initialization

pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod retry;

pub use config::{PipelineConfig, RetryConfig, SubmitPolicy};
pub use error::{PipelineError, Result, TransientError};
pub use executor::JobExecutor;
pub use job::{Batch, FailedJob, Job, JobId};
pub use pipeline::stats::{PipelineStats, StatsSnapshot};
pub use pipeline::{LifecycleState, Pipeline, PipelineHandle, SubmitOutcome};
pub use retry::{DefaultRetryClassifier, RetryClassifier};
