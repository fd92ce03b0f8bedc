use axum::{
    extract::{Path, State},
    Json,
};
use base64::Engine;
use serde_json::{json, Value};
use tracing::warn;

use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    error::Error,
    models::MessageView,
    SharedBlobStore,
};

/// GET /api/v1/messages/{id}
pub async fn get_message(
    State(pool): State<DbPool>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageView>, Error> {
    let message = db::get_message(&pool, &id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

    if !message.viewable_by(&user_id) {
        return Err(Error::Forbidden);
    }

    Ok(Json(message.to_view(Some(&user_id), false)))
}

/// GET /api/v1/messages/{id}/content
///
/// Returns the ciphertext, preferring the blob store once the message is
/// anchored and falling back to the relational row.
pub async fn get_message_content(
    State(pool): State<DbPool>,
    State(blobs): State<SharedBlobStore>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    let message = db::get_message(&pool, &id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

    if !message.viewable_by(&user_id) {
        return Err(Error::Forbidden);
    }

    let ciphertext = match &message.blob_address {
        Some(address) => match blobs.get(address).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(message_id = %id, error = %e, "Blob fetch failed; serving row copy");
                message.encrypted_content.clone()
            }
        },
        None => message.encrypted_content.clone(),
    };

    Ok(Json(json!({
        "id": message.id,
        "content_type": message.content_type,
        "encrypted_content": base64::engine::general_purpose::STANDARD.encode(ciphertext),
    })))
}
