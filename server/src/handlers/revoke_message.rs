use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    actions::{self, ActionOutcome},
    auth::AuthUser,
    error::Error,
    models::MessageView,
    realtime::SharedEventBus,
    SharedBlobStore, SharedIndex, SharedLedger, SharedStore,
};

/// POST /api/v1/messages/{id}/revoke
///
/// Sender-only. Transitions to `revoked` and synchronously releases the
/// anchoring footprint; revoking an already-terminal message is a no-op.
pub async fn revoke_message(
    State(store): State<SharedStore>,
    State(blobs): State<SharedBlobStore>,
    State(ledger): State<SharedLedger>,
    State(index): State<SharedIndex>,
    State(bus): State<SharedEventBus>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageView>, Error> {
    let outcome = actions::revoke(
        store.as_ref(),
        blobs.as_ref(),
        ledger.as_ref(),
        index.as_ref(),
        bus.as_ref(),
        &id,
        &user_id,
    )
    .await?;

    match outcome {
        ActionOutcome::NotFound | ActionOutcome::Deleted => {
            Err(Error::NotFound(format!("message {id}")))
        }
        ActionOutcome::Forbidden => Err(Error::Forbidden),
        ActionOutcome::Updated(message) | ActionOutcome::Unchanged(message) => {
            Ok(Json(message.to_view(Some(&user_id), false)))
        }
    }
}
