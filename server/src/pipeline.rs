//! The anchoring pipeline: drives a freshly created message through the blob
//! store and the ledger, records it in the metadata index, and advances the
//! durability state machine.
//!
//! Each step persists a checkpoint field before proceeding, so a crashed or
//! retried attempt resumes at whichever step has unset fields instead of
//! redoing work. Correctness under concurrent scheduling comes from the
//! store's compare-and-set transitions, not from in-memory locks: a CAS that
//! reports no change means another writer (revoke, expiry) got there first,
//! and the attempt backs off without error.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::{build_commitment, BlobStore, Ledger, MetadataIndex};
use crate::models::Message;
use crate::realtime::EventBus;
use crate::store::MessageStore;
use crate::unwind::{revoke_commitment, unpin_blob};

pub struct AnchorPipeline {
    store: Arc<dyn MessageStore>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    index: Arc<dyn MetadataIndex>,
    events: Arc<EventBus>,
}

impl AnchorPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
        index: Arc<dyn MetadataIndex>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            blobs,
            ledger,
            index,
            events,
        }
    }

    /// Perform at most one full anchoring attempt for the message.
    ///
    /// Idempotent entry guard: a message that already carries a ledger
    /// commitment, or that reached a terminal delivery state, is left
    /// untouched. Any step failure marks the attempt `failed` and propagates
    /// the error to the caller's retry mechanism.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, message_id: &str) -> Result<()> {
        let Some(message) = self.store.get(message_id).await? else {
            debug!("Message gone before anchoring; nothing to do");
            return Ok(());
        };

        if message.status.is_terminal() {
            debug!(status = ?message.status, "Message in terminal state; skipping anchoring");
            return Ok(());
        }

        if message.ledger_commitment.is_some() {
            debug!("Message already anchored; duplicate attempt is a no-op");
            return Ok(());
        }

        match self.anchor(&message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(update_err) = self.store.mark_anchor_failed(message_id).await {
                    warn!(error = %update_err, "Failed to record anchor failure");
                }
                crate::metrics::record_anchor_failure();
                Err(e)
            }
        }
    }

    async fn anchor(&self, message: &Message) -> Result<()> {
        let (sender_ref, recipient_ref) = message
            .participant_addresses()
            .context("Message metadata is missing participant ledger addresses")?;

        // Step 1: blob put + pin. Skipped entirely when a previous attempt
        // already checkpointed the address.
        let blob_address = match &message.blob_address {
            Some(address) => {
                debug!(address = %address, "Blob already stored; skipping upload");
                address.clone()
            }
            None => {
                let address = self
                    .blobs
                    .put(&message.encrypted_content)
                    .await
                    .context("Blob store put failed")?;
                self.blobs
                    .pin(&address)
                    .await
                    .context("Blob store pin failed")?;

                if !self.store.record_blob_address(&message.id, &address).await? {
                    // Revoke or expiry won the race. The address was never
                    // persisted, so no later unwind can see it; release the
                    // pin here before backing off.
                    warn!(address = %address, "Message changed state during blob upload; stopping attempt");
                    unpin_blob(self.blobs.as_ref(), &message.id, &address).await;
                    return Ok(());
                }
                address
            }
        };

        // Step 2: ledger commit; blocks until the transaction is included or
        // the bounded receipt wait elapses.
        let commitment = build_commitment(&sender_ref, &recipient_ref, &blob_address);
        let tx_ref = self
            .ledger
            .commit(&commitment, &recipient_ref, &sender_ref)
            .await
            .context("Ledger submission failed")?;
        let receipt = self
            .ledger
            .await_receipt(&tx_ref)
            .await
            .context("Ledger receipt wait failed")?;
        if !receipt.success {
            bail!("ledger transaction {tx_ref} was included but unsuccessful");
        }

        if !self.store.record_anchored(&message.id, &commitment).await? {
            // The commitment was confirmed but will never be persisted; no
            // null-checked unwind can revoke it, so do that here. The blob
            // address checkpoint survives for the row's own unwind.
            warn!("Message changed state during ledger confirmation; revoking commitment");
            revoke_commitment(self.ledger.as_ref(), &message.id, &commitment).await;
            return Ok(());
        }

        crate::metrics::record_message_anchored();

        // Step 3: advisory side index. Failure is logged and never rolls
        // back the anchoring above.
        let mut record = message.to_index_record("pending");
        record.blob_address = Some(blob_address);
        record.ledger_commitment = Some(commitment);
        if let Err(e) = self.index.upsert(&record).await {
            warn!(error = %e, "Metadata index upsert failed; continuing");
        }

        // Notify both participants of the new durability state.
        if let Some(updated) = self.store.get(&message.id).await? {
            self.events.emit_status_update(&updated).await;
        }

        Ok(())
    }
}
