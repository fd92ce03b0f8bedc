//! Real-time fan-out to message participants.
//!
//! Events are broadcast per user: each participant has a lazily created
//! broadcast channel and an SSE subscription draining it. Emission is
//! fire-and-forget from the callers' perspective; a participant with no open
//! subscription simply misses the event and catches up over the REST API.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::Message;

pub mod sse;

pub use sse::subscribe_events;

/// A single event on a user's stream.
#[derive(Debug, Clone, Serialize)]
pub struct MessageEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub action: &'static str,
    pub data: serde_json::Value,
}

/// Per-user broadcast channels.
pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<MessageEvent>>>,
    buffer_size: usize,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer_size,
        }
    }

    /// Get or create the broadcast channel for a user.
    async fn channel_for(&self, user_id: &str) -> broadcast::Sender<MessageEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(self.buffer_size);
                debug!(user_id = %user_id, "Created broadcast channel");
                tx
            })
            .clone()
    }

    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<MessageEvent> {
        self.channel_for(user_id).await.subscribe()
    }

    async fn emit_to(&self, user_id: &str, event: MessageEvent) {
        let tx = self.channel_for(user_id).await;
        // A send error only means nobody is listening right now.
        if tx.send(event).is_err() {
            debug!(user_id = %user_id, "No active subscribers for event");
        }
    }

    /// New message: both participants get a personalized view (capabilities
    /// are viewer-dependent; content is never included).
    pub async fn emit_created(&self, message: &Message) {
        for user_id in [&message.sender_id, &message.recipient_id] {
            self.emit_to(
                user_id,
                MessageEvent {
                    kind: "message",
                    action: "created",
                    data: serde_json::to_value(message.to_view(Some(user_id), false))
                        .unwrap_or_default(),
                },
            )
            .await;
        }
    }

    /// Anchoring progress: `{id, status, blockchain_status, is_read, read_at}`.
    pub async fn emit_status_update(&self, message: &Message) {
        for user_id in [&message.sender_id, &message.recipient_id] {
            self.emit_to(
                user_id,
                MessageEvent {
                    kind: "message",
                    action: "updated",
                    data: message.status_payload(),
                },
            )
            .await;
        }
    }

    /// Read receipt: a distinct payload from the anchoring update.
    pub async fn emit_read_receipt(&self, message: &Message) {
        for user_id in [&message.sender_id, &message.recipient_id] {
            self.emit_to(
                user_id,
                MessageEvent {
                    kind: "message",
                    action: "read",
                    data: message.read_receipt_payload(),
                },
            )
            .await;
        }
    }
}

/// Shared handle used across handlers and jobs.
pub type SharedEventBus = Arc<EventBus>;
