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
    SharedStore,
};

/// POST /api/v1/messages/{id}/read
///
/// Recipient-only. A second call, or a call on a terminal message, is a
/// no-op returning the current state.
pub async fn mark_read(
    State(store): State<SharedStore>,
    State(bus): State<SharedEventBus>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageView>, Error> {
    match actions::mark_read(store.as_ref(), bus.as_ref(), &id, &user_id).await? {
        ActionOutcome::NotFound | ActionOutcome::Deleted => {
            Err(Error::NotFound(format!("message {id}")))
        }
        ActionOutcome::Forbidden => Err(Error::Forbidden),
        ActionOutcome::Updated(message) | ActionOutcome::Unchanged(message) => {
            Ok(Json(message.to_view(Some(&user_id), false)))
        }
    }
}
