//! Background worker consuming the anchoring queue.
//!
//! Message creation enqueues exactly one attempt per message id. Each
//! invocation runs on its own task so a ledger confirmation wait never
//! blocks unrelated messages, with a semaphore bounding concurrent ledger
//! submissions. Failed attempts are retried with exponential backoff up to a
//! configured limit; after exhaustion the message stays visibly `failed`
//! until an external re-trigger.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::pipeline::AnchorPipeline;

/// Sending half of the anchoring queue; cheap to clone into handlers.
#[derive(Clone)]
pub struct AnchorQueue {
    tx: mpsc::Sender<String>,
}

impl AnchorQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue one anchoring attempt for the message.
    pub async fn enqueue(&self, message_id: String) -> Result<()> {
        self.tx
            .send(message_id)
            .await
            .context("Anchor queue is closed")
    }
}

#[derive(Debug, Clone)]
pub struct AnchorWorkerConfig {
    /// Upper bound on concurrently running anchoring attempts.
    pub concurrency: usize,
    /// Attempts per message before giving up and leaving it `failed`.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay: Duration,
}

impl Default for AnchorWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: std::env::var("ANCHOR_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(8),
            max_attempts: std::env::var("ANCHOR_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(5),
            retry_base_delay: Duration::from_secs(
                std::env::var("ANCHOR_RETRY_BASE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// Run the anchor worker until the queue closes.
pub async fn run_anchor_worker(
    pipeline: Arc<AnchorPipeline>,
    mut rx: mpsc::Receiver<String>,
    config: AnchorWorkerConfig,
) {
    let limiter = Arc::new(Semaphore::new(config.concurrency));

    info!(
        concurrency = config.concurrency,
        max_attempts = config.max_attempts,
        "Starting anchor worker"
    );

    while let Some(message_id) = rx.recv().await {
        let permit = match limiter.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break, // semaphore closed, shutting down
        };

        let pipeline = pipeline.clone();
        let max_attempts = config.max_attempts;
        let base_delay = config.retry_base_delay;

        tokio::spawn(async move {
            let _permit = permit;
            let mut attempt: u32 = 1;

            loop {
                match pipeline.run(&message_id).await {
                    Ok(()) => break,
                    Err(e) if attempt < max_attempts => {
                        let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                        warn!(
                            message_id = %message_id,
                            attempt,
                            delay_secs = delay.as_secs(),
                            error = %e,
                            "Anchoring attempt failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        error!(
                            message_id = %message_id,
                            attempts = attempt,
                            error = %e,
                            "Anchoring failed permanently; message remains failed"
                        );
                        break;
                    }
                }
            }
        });
    }

    info!("Anchor queue closed; worker shutting down");
}
