//! The pluggable job execution seam.
//!
//! The pipeline treats execution as opaque: it invokes [`JobExecutor::run`]
//! once per attempt and classifies whatever comes back. An executor error is
//! routed, never propagated as a process-fatal fault, and a panicking executor
//! is isolated by the processing stage rather than tearing the pipeline down.

use std::future::Future;

use async_trait::async_trait;

use crate::job::Job;

/// Caller-supplied execution capability.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use jobflow::{Job, JobExecutor};
///
/// struct PrintExecutor;
///
/// #[async_trait]
/// impl JobExecutor<String> for PrintExecutor {
///     async fn run(&self, job: &Job<String>) -> anyhow::Result<()> {
///         println!("{}: {}", job.id, job.payload);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor<P>: Send + Sync {
    async fn run(&self, job: &Job<P>) -> anyhow::Result<()>;
}

/// Plain async closures double as executors, which keeps small callers and
/// tests free of boilerplate. The closure receives the job by value.
#[async_trait]
impl<P, F, Fut> JobExecutor<P> for F
where
    P: Clone + Send + Sync + 'static,
    F: Fn(Job<P>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self, job: &Job<P>) -> anyhow::Result<()> {
        self(job.clone()).await
    }
}
