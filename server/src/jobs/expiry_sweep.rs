//! Background worker reversing pipeline effects for expired messages.
//!
//! Each tick enumerates expired messages in batches, releases their
//! anchoring footprint best-effort, and destroys the rows. The row is the
//! primary record of intent-to-delete: a failed unpin or revocation is
//! logged and never blocks the deletion, so cleanup converges even when a
//! backing store is down (at the cost of orphaned blobs or un-revoked
//! ledger entries, which are not reconciled here).

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::clients::{BlobStore, Ledger, MetadataIndex};
use crate::store::MessageStore;
use crate::unwind::release_anchors;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Messages fetched per batch to bound memory.
    pub batch_size: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(
                std::env::var("EXPIRY_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(300),
            ),
            batch_size: std::env::var("EXPIRY_SWEEP_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(200),
        }
    }
}

/// Run the expiry sweep on a fixed interval.
pub async fn run_expiry_sweep_worker(
    store: Arc<dyn MessageStore>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    index: Arc<dyn MetadataIndex>,
    config: SweepConfig,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        "Starting expiry sweep worker"
    );

    loop {
        ticker.tick().await;

        match sweep_once(
            store.as_ref(),
            blobs.as_ref(),
            ledger.as_ref(),
            index.as_ref(),
            config.batch_size,
        )
        .await
        {
            Ok(0) => {}
            Ok(count) => info!(expired = count, "Expiry sweep destroyed messages"),
            Err(e) => error!(error = %e, "Expiry sweep failed"),
        }
    }
}

/// One full sweep pass: drain all currently expired messages in batches.
/// Returns the number of rows destroyed.
pub async fn sweep_once(
    store: &dyn MessageStore,
    blobs: &dyn BlobStore,
    ledger: &dyn Ledger,
    index: &dyn MetadataIndex,
    batch_size: i64,
) -> Result<u64> {
    let now = Utc::now();
    let mut destroyed: u64 = 0;

    loop {
        let batch = store.expired_batch(now, batch_size).await?;
        if batch.is_empty() {
            break;
        }

        let fetched = batch.len();
        let mut deleted_in_batch: u64 = 0;

        for message in batch {
            release_anchors(blobs, ledger, index, &message, "expired").await;

            match store.delete(&message.id).await {
                Ok(true) => {
                    deleted_in_batch += 1;
                    crate::metrics::record_message_expired();
                }
                Ok(false) => {} // already gone, fine
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "Failed to destroy expired message");
                }
            }
        }

        destroyed += deleted_in_batch;

        // A short batch means the backlog is drained. A batch where every
        // delete errored also breaks out; those rows are picked up again on
        // the next tick instead of being retried in a tight loop here.
        if fetched < batch_size as usize || deleted_in_batch == 0 {
            break;
        }
    }

    // Side index keeps its own expiry clock as well.
    if let Err(e) = index.delete_expired_before(now).await {
        warn!(error = %e, "Metadata index expired-delete failed");
    }

    Ok(destroyed)
}
