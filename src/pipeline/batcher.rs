//! Batch accumulation stage.
//!
//! Consumes the intake queue (fresh submissions and re-injected retries fan in
//! upstream of this stage) and emits a batch once exactly `batch_size` jobs
//! have accumulated. There is no timer-based flush; a partial batch leaves
//! this stage only through the shutdown flush policy.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::stats::PipelineStats;
use crate::job::{Batch, Job};

pub(crate) async fn run_batcher<P>(
    mut intake: mpsc::Receiver<Job<P>>,
    batches: mpsc::Sender<Batch<P>>,
    batch_size: usize,
    flush_partial: bool,
    token: CancellationToken,
    stats: Arc<PipelineStats>,
) where
    P: Send + 'static,
{
    let mut pending: Batch<P> = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                flush_pending(pending, &batches, flush_partial, &stats);
                debug!("batcher stopping on cancellation");
                return;
            }
            received = intake.recv() => match received {
                Some(job) => {
                    pending.push(job);
                    if pending.len() < batch_size {
                        continue;
                    }
                    let full = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
                    tokio::select! {
                        _ = token.cancelled() => {
                            flush_pending(full, &batches, flush_partial, &stats);
                            debug!("batcher stopping on cancellation");
                            return;
                        }
                        permit = batches.reserve() => {
                            match permit {
                                Ok(permit) => {
                                    permit.send(full);
                                    PipelineStats::incr(&stats.batches_emitted);
                                }
                                Err(_) => {
                                    warn!("batch consumer gone, batcher stopping");
                                    return;
                                }
                            }
                        }
                    }
                }
                None => {
                    flush_pending(pending, &batches, flush_partial, &stats);
                    debug!("intake closed, batcher stopping");
                    return;
                }
            }
        }
    }
}

/// Shutdown disposition of an incomplete batch: discarded by default, handed
/// downstream best-effort when the flush policy is enabled. The processor may
/// already have exited, in which case the flush is dropped with the channel.
fn flush_pending<P>(
    pending: Batch<P>,
    batches: &mpsc::Sender<Batch<P>>,
    flush_partial: bool,
    stats: &PipelineStats,
) {
    if pending.is_empty() {
        return;
    }
    if !flush_partial {
        debug!(discarded = pending.len(), "discarding partial batch on shutdown");
        return;
    }
    let size = pending.len();
    match batches.try_send(pending) {
        Ok(()) => {
            PipelineStats::incr(&stats.batches_emitted);
            debug!(size, "flushed partial batch on shutdown");
        }
        Err(_) => debug!(size, "partial batch not flushed, consumer unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn jobs(n: usize) -> Vec<Job<usize>> {
        (0..n).map(Job::new).collect()
    }

    #[tokio::test]
    async fn emits_only_full_batches() {
        let (intake_tx, intake_rx) = mpsc::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let stats = Arc::new(PipelineStats::default());

        let handle = tokio::spawn(run_batcher(
            intake_rx,
            batch_tx,
            3,
            false,
            token.clone(),
            stats.clone(),
        ));

        for job in jobs(7) {
            intake_tx.send(job).await.unwrap();
        }

        let first = batch_rx.recv().await.unwrap();
        let second = batch_rx.recv().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(
            first.iter().map(|j| j.payload).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        // The seventh job stays buffered and is discarded on cancellation.
        token.cancel();
        handle.await.unwrap();
        assert!(batch_rx.recv().await.is_none());
        assert_eq!(stats.snapshot().batches_emitted, 2);
    }

    #[tokio::test]
    async fn flush_policy_emits_the_partial_batch() {
        let (intake_tx, intake_rx) = mpsc::channel(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let stats = Arc::new(PipelineStats::default());

        let handle = tokio::spawn(run_batcher(
            intake_rx,
            batch_tx,
            5,
            true,
            token.clone(),
            stats.clone(),
        ));

        for job in jobs(2) {
            intake_tx.send(job).await.unwrap();
        }
        // Let the batcher drain the intake before cancelling.
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap();

        let partial = batch_rx.recv().await.unwrap();
        assert_eq!(partial.len(), 2);
        assert_eq!(stats.snapshot().batches_emitted, 1);
    }

    #[tokio::test]
    async fn closed_intake_stops_the_stage() {
        let (intake_tx, intake_rx) = mpsc::channel::<Job<usize>>(16);
        let (batch_tx, mut batch_rx) = mpsc::channel(16);
        let token = CancellationToken::new();
        let stats = Arc::new(PipelineStats::default());

        let handle = tokio::spawn(run_batcher(
            intake_rx,
            batch_tx,
            4,
            false,
            token,
            stats,
        ));

        drop(intake_tx);
        handle.await.unwrap();
        assert!(batch_rx.recv().await.is_none());
    }
}
