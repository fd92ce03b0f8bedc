use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    actions::{self, ActionOutcome},
    auth::AuthUser,
    error::Error,
    SharedBlobStore, SharedIndex, SharedLedger, SharedStore,
};

/// DELETE /api/v1/messages/{id}
///
/// Sender-only. Releases the anchoring footprint first, then removes the
/// row.
pub async fn destroy_message(
    State(store): State<SharedStore>,
    State(blobs): State<SharedBlobStore>,
    State(ledger): State<SharedLedger>,
    State(index): State<SharedIndex>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    let outcome = actions::destroy(
        store.as_ref(),
        blobs.as_ref(),
        ledger.as_ref(),
        index.as_ref(),
        &id,
        &user_id,
    )
    .await?;

    match outcome {
        ActionOutcome::NotFound => Err(Error::NotFound(format!("message {id}"))),
        ActionOutcome::Forbidden => Err(Error::Forbidden),
        _ => Ok(Json(json!({ "success": true }))),
    }
}
