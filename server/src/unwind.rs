//! Best-effort release of a message's anchoring footprint.
//!
//! Used by revoke, explicit destroy, and the expiry sweep. Every sub-step is
//! null-checked against the checkpoint fields, so a partially anchored
//! message (blob stored, ledger never confirmed) unwinds exactly what
//! exists. Failures are logged and swallowed; the caller always proceeds,
//! accepting orphaned blobs or un-revoked ledger entries as a residual
//! failure mode.

use tracing::warn;

use crate::clients::{BlobStore, Ledger, MetadataIndex};
use crate::models::Message;

/// Best-effort ledger revocation of a confirmed commitment.
pub async fn revoke_commitment(ledger: &dyn Ledger, message_id: &str, commitment: &str) {
    let outcome = async {
        let tx_ref = ledger.revoke(commitment).await?;
        let receipt = ledger.await_receipt(&tx_ref).await?;
        if !receipt.success {
            anyhow::bail!("revocation transaction {tx_ref} was included but unsuccessful");
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = outcome {
        warn!(
            message_id = %message_id,
            commitment = %commitment,
            error = %e,
            "Ledger revocation failed; commitment left on ledger"
        );
        crate::metrics::record_unwind_failure();
    }
}

/// Best-effort unpin of a stored blob.
pub async fn unpin_blob(blobs: &dyn BlobStore, message_id: &str, address: &str) {
    if let Err(e) = blobs.unpin(address).await {
        warn!(
            message_id = %message_id,
            address = %address,
            error = %e,
            "Blob unpin failed; blob left pinned"
        );
        crate::metrics::record_unwind_failure();
    }
}

/// Revoke the ledger entry, unpin the blob, and mark the index record with
/// `mark` — each only if the corresponding field is set, each best-effort.
pub async fn release_anchors(
    blobs: &dyn BlobStore,
    ledger: &dyn Ledger,
    index: &dyn MetadataIndex,
    message: &Message,
    mark: &str,
) {
    if let Some(commitment) = &message.ledger_commitment {
        revoke_commitment(ledger, &message.id, commitment).await;
    }

    if let Some(address) = &message.blob_address {
        unpin_blob(blobs, &message.id, address).await;
    }

    if let Err(e) = index.set_status(&message.id, mark).await {
        warn!(
            message_id = %message.id,
            error = %e,
            "Metadata index status update failed"
        );
    }
}
