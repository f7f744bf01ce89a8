//! Retry fan-in relay.
//!
//! Dedicated task between the processor and the batcher's intake queue. The
//! processor hands retries to this relay instead of writing into the intake
//! directly, so retry injection and fresh-job intake stay structurally
//! independent and neither stage can block on the other.
//!
//! The relay's intake sender is dropped only after the processor has closed
//! the retry channel, so a retry still in flight is never silently lost to an
//! early close.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::processor::RetryEnvelope;
use crate::job::Job;

pub(crate) async fn run_relay<P>(
    mut retries: mpsc::Receiver<RetryEnvelope<P>>,
    intake: mpsc::Sender<Job<P>>,
    token: CancellationToken,
) where
    P: Send + 'static,
{
    loop {
        let envelope = tokio::select! {
            _ = token.cancelled() => {
                debug!("retry relay stopping on cancellation");
                return;
            }
            received = retries.recv() => match received {
                Some(envelope) => envelope,
                None => {
                    debug!("retry channel closed, relay stopping");
                    return;
                }
            }
        };

        // Backoff is served in line: a delayed retry holds back the retries
        // queued behind it.
        if !envelope.delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("retry relay stopping during backoff");
                    return;
                }
                _ = tokio::time::sleep(envelope.delay) => {}
            }
        }

        tokio::select! {
            _ = token.cancelled() => {
                debug!("retry relay stopping on cancellation");
                return;
            }
            sent = intake.send(envelope.job) => {
                if sent.is_err() {
                    warn!("intake closed, retry relay stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_retries_into_the_intake() {
        let (retry_tx, retry_rx) = mpsc::channel(4);
        let (intake_tx, mut intake_rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_relay(retry_rx, intake_tx, token));

        retry_tx
            .send(RetryEnvelope {
                job: Job::with_id("j-1", 1u32),
                delay: Duration::ZERO,
            })
            .await
            .unwrap();

        let job = intake_rx.recv().await.unwrap();
        assert_eq!(job.id.as_str(), "j-1");

        // Closing the retry channel shuts the relay down and releases its
        // intake sender.
        drop(retry_tx);
        handle.await.unwrap();
        assert!(intake_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_backoff() {
        let (retry_tx, retry_rx) = mpsc::channel(4);
        let (intake_tx, mut intake_rx) = mpsc::channel(4);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_relay(retry_rx, intake_tx, token.clone()));

        retry_tx
            .send(RetryEnvelope {
                job: Job::with_id("j-slow", 1u32),
                delay: Duration::from_secs(60),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay must exit promptly after cancellation")
            .unwrap();
        assert!(intake_rx.recv().await.is_none());
    }
}
