use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    error::Error,
    models::MessageView,
};

#[derive(Debug, Deserialize)]
pub struct UpdateMessageInput {
    pub expires_at: Option<DateTime<Utc>>,
    /// Merged over the existing metadata map; anchoring fields are never
    /// user-writable.
    pub metadata: Option<serde_json::Value>,
}

/// PATCH /api/v1/messages/{id}
///
/// Sender-only; rejected once the message is terminal.
pub async fn update_message(
    State(pool): State<DbPool>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateMessageInput>,
) -> Result<Json<MessageView>, Error> {
    let message = db::get_message(&pool, &id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

    if message.sender_id != user_id {
        return Err(Error::Forbidden);
    }
    if message.status.is_terminal() {
        return Err(Error::InvalidRequest(
            "message is no longer editable".to_string(),
        ));
    }

    if let Some(metadata) = &input.metadata {
        if !metadata.is_object() {
            return Err(Error::InvalidRequest("metadata must be an object".to_string()));
        }
    }

    let updated = db::update_message(&pool, &id, input.expires_at, input.metadata)
        .await?
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

    Ok(Json(updated.to_view(Some(&user_id), false)))
}
