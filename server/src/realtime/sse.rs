//! SSE endpoint streaming a user's message events.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use super::SharedEventBus;
use crate::auth::AuthUser;

/// GET /api/v1/events
///
/// Streams `created` / `updated` / `read` events for every message the
/// authenticated user participates in.
pub async fn subscribe_events(
    State(bus): State<SharedEventBus>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user_id, "SSE subscription opened");

    let rx = bus.subscribe(&user_id).await;

    let stream = BroadcastStream::new(rx).filter_map(|item| async move {
        match item {
            // Lagged receivers drop the missed events; clients reconcile
            // over the REST API.
            Err(_) => None,
            Ok(event) => Event::default()
                .event("message")
                .json_data(&event)
                .ok()
                .map(Ok),
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
