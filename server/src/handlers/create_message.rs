use axum::{extract::State, http::StatusCode, Json};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    error::Error,
    jobs::AnchorQueue,
    models::MessageView,
    realtime::SharedEventBus,
};

const MAX_CIPHERTEXT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreateMessageInput {
    pub recipient_id: String,
    /// Base64-encoded ciphertext; the server never interprets it.
    pub content: String,
    pub content_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /api/v1/messages
///
/// Inserts the row and enqueues exactly one anchoring attempt.
pub async fn create_message(
    State(pool): State<DbPool>,
    State(queue): State<AnchorQueue>,
    State(bus): State<SharedEventBus>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<CreateMessageInput>,
) -> Result<(StatusCode, Json<MessageView>), Error> {
    let sender = db::get_user(&pool, &user_id)
        .await?
        .ok_or(Error::Forbidden)?;
    let recipient = db::get_user(&pool, &input.recipient_id)
        .await?
        .ok_or_else(|| Error::InvalidRequest("unknown recipient".to_string()))?;

    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(&input.content)
        .map_err(|_| Error::InvalidRequest("content must be base64".to_string()))?;

    if ciphertext.is_empty() {
        return Err(Error::InvalidRequest("empty ciphertext".to_string()));
    }
    if ciphertext.len() > MAX_CIPHERTEXT_BYTES {
        return Err(Error::InvalidRequest("ciphertext too large".to_string()));
    }

    let content_type = input.content_type.as_deref().unwrap_or("text");

    let message = db::create_message(
        &pool,
        &sender,
        &recipient,
        ciphertext,
        content_type,
        input.expires_at,
    )
    .await?;

    // The row exists either way; a full queue is an operational failure the
    // sender should see.
    if let Err(e) = queue.enqueue(message.id.clone()).await {
        error!(message_id = %message.id, error = %e, "Failed to enqueue anchoring attempt");
        return Err(Error::Internal(e));
    }

    crate::metrics::record_message_created();
    bus.emit_created(&message).await;

    Ok((
        StatusCode::CREATED,
        Json(message.to_view(Some(&user_id), false)),
    ))
}
