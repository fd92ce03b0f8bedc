use axum::{extract::State, Json};

use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    error::Error,
    models::MessageView,
};

/// GET /api/v1/messages
pub async fn list_messages(
    State(pool): State<DbPool>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<MessageView>>, Error> {
    let messages = db::list_messages_for_user(&pool, &user_id).await?;

    Ok(Json(
        messages
            .iter()
            .map(|m| m.to_view(Some(&user_id), false))
            .collect(),
    ))
}

/// GET /api/v1/messages/unread
pub async fn unread_messages(
    State(pool): State<DbPool>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<MessageView>>, Error> {
    let messages = db::unread_messages_for_user(&pool, &user_id).await?;

    Ok(Json(
        messages
            .iter()
            .map(|m| m.to_view(Some(&user_id), false))
            .collect(),
    ))
}
