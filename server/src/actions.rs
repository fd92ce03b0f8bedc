//! Read, revoke, and destroy actions on a message.
//!
//! These are the delivery-state transitions initiated by users, expressed
//! over the same injected collaborators as the pipeline so they obey the
//! same CAS discipline. Operations on terminal or already-transitioned
//! messages are no-ops returning success, which makes them idempotent under
//! retry or duplicate client action.

use anyhow::Result;
use chrono::Utc;

use crate::clients::{BlobStore, Ledger, MetadataIndex};
use crate::models::{Message, MessageStatus};
use crate::realtime::EventBus;
use crate::store::MessageStore;
use crate::unwind::release_anchors;

#[derive(Debug)]
pub enum ActionOutcome {
    NotFound,
    /// The actor is not allowed to perform this action on this message.
    Forbidden,
    /// The transition happened; carries the refreshed row.
    Updated(Message),
    /// Nothing to do (already read / already terminal); carries the row.
    Unchanged(Message),
    /// The row was destroyed.
    Deleted,
}

/// Mark a message read. Recipient-only; sets `is_read`, `read_at` and
/// `status` together, exactly once, and emits a read receipt distinct from
/// the anchoring notification. Only a delivered message can be read: a
/// still-pending one is left untouched so anchoring completion can claim it.
pub async fn mark_read(
    store: &dyn MessageStore,
    events: &EventBus,
    message_id: &str,
    actor: &str,
) -> Result<ActionOutcome> {
    let Some(message) = store.get(message_id).await? else {
        return Ok(ActionOutcome::NotFound);
    };

    if message.recipient_id != actor {
        return Ok(ActionOutcome::Forbidden);
    }

    if message.is_read || message.status != MessageStatus::Delivered {
        return Ok(ActionOutcome::Unchanged(message));
    }

    if !store.mark_read(message_id, Utc::now()).await? {
        // Lost a race with another reader or with expiry; report whatever
        // state the row is in now.
        return Ok(match store.get(message_id).await? {
            Some(current) => ActionOutcome::Unchanged(current),
            None => ActionOutcome::NotFound,
        });
    }

    match store.get(message_id).await? {
        Some(updated) => {
            events.emit_read_receipt(&updated).await;
            Ok(ActionOutcome::Updated(updated))
        }
        None => Ok(ActionOutcome::NotFound),
    }
}

/// Revoke a message. Sender-only; transitions to `revoked` and synchronously
/// releases the anchoring footprint, mirroring the expiry sweep's cleanup
/// but keeping the row.
pub async fn revoke(
    store: &dyn MessageStore,
    blobs: &dyn BlobStore,
    ledger: &dyn Ledger,
    index: &dyn MetadataIndex,
    events: &EventBus,
    message_id: &str,
    actor: &str,
) -> Result<ActionOutcome> {
    let Some(message) = store.get(message_id).await? else {
        return Ok(ActionOutcome::NotFound);
    };

    if message.sender_id != actor {
        return Ok(ActionOutcome::Forbidden);
    }

    if message.status.is_terminal() {
        return Ok(ActionOutcome::Unchanged(message));
    }

    if !store.mark_revoked(message_id).await? {
        return Ok(match store.get(message_id).await? {
            Some(current) => ActionOutcome::Unchanged(current),
            None => ActionOutcome::NotFound,
        });
    }

    crate::metrics::record_message_revoked();

    match store.get(message_id).await? {
        Some(revoked) => {
            release_anchors(blobs, ledger, index, &revoked, "revoked").await;
            events.emit_status_update(&revoked).await;
            Ok(ActionOutcome::Updated(revoked))
        }
        None => Ok(ActionOutcome::NotFound),
    }
}

/// Destroy a message row. Sender-only; releases the anchoring footprint
/// first, then deletes. Unwind failures never block the deletion.
pub async fn destroy(
    store: &dyn MessageStore,
    blobs: &dyn BlobStore,
    ledger: &dyn Ledger,
    index: &dyn MetadataIndex,
    message_id: &str,
    actor: &str,
) -> Result<ActionOutcome> {
    let Some(message) = store.get(message_id).await? else {
        return Ok(ActionOutcome::NotFound);
    };

    if message.sender_id != actor {
        return Ok(ActionOutcome::Forbidden);
    }

    release_anchors(blobs, ledger, index, &message, "deleted").await;
    store.delete(message_id).await?;

    Ok(ActionOutcome::Deleted)
}
