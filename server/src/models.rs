//! Database models and API views for messages and users.
//!
//! A message carries two independent state machines: the delivery `status`
//! (pending → delivered → read, with revoked/expired as terminal states) and
//! the durability `anchor_status` tracking progress through the blob store
//! and ledger. The transition predicates live here; atomicity is enforced by
//! the conditional updates in `db`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Expired,
    Revoked,
}

impl MessageStatus {
    /// Terminal states admit no further transitions; operations on a
    /// terminal message are no-ops rather than errors.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Expired | MessageStatus::Revoked)
    }
}

/// Durability state: progress of the message through the blob store and
/// ledger. `not_stored → storing → {stored, failed}`; `failed` can only be
/// re-driven by an external retry, which re-enters the pipeline at whichever
/// step has unset checkpoint fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "anchor_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    NotStored,
    Storing,
    Stored,
    Failed,
}

/// Database representation of a user. Provisioned by the external auth
/// service; read-only to this core.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Address the ledger knows this user by; used in commitment construction.
    pub ledger_address: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

/// Database representation of a message. Maps to the `messages` table.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub encrypted_content: Vec<u8>,
    pub content_type: String,
    pub size: i64,
    pub blob_address: Option<String>,
    pub ledger_commitment: Option<String>,
    pub anchor_status: AnchorStatus,
    pub status: MessageStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    pub fn viewable_by(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }

    /// Ledger references of both participants, captured into `metadata` at
    /// creation so the pipeline does not depend on the users table.
    pub fn participant_addresses(&self) -> Option<(String, String)> {
        let sender = self.metadata.get("sender_address")?.as_str()?;
        let recipient = self.metadata.get("recipient_address")?.as_str()?;
        Some((sender.to_string(), recipient.to_string()))
    }

    /// Build the denormalized side-index record for this message.
    pub fn to_index_record(&self, status: &str) -> IndexRecord {
        IndexRecord {
            message_id: self.id.clone(),
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            blob_address: self.blob_address.clone(),
            ledger_commitment: self.ledger_commitment.clone(),
            message_type: self.content_type.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            status: status.to_string(),
        }
    }

    /// Convert to the API view. `encrypted_content` is withheld unless
    /// explicitly requested; `can_*` capabilities are computed against the
    /// viewing user when one is given.
    pub fn to_view(&self, viewer: Option<&str>, include_content: bool) -> MessageView {
        MessageView {
            id: self.id.clone(),
            sender_id: self.sender_id.clone(),
            recipient_id: self.recipient_id.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            blob_address: self.blob_address.clone(),
            ledger_commitment: self.ledger_commitment.clone(),
            blockchain_status: self.anchor_status,
            status: self.status,
            is_read: self.is_read,
            read_at: self.read_at,
            expires_at: self.expires_at,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            encrypted_content: include_content.then(|| base64_encode(&self.encrypted_content)),
            can_revoke: viewer.map(|u| self.sender_id == u && self.status != MessageStatus::Revoked),
            can_mark_as_read: viewer.map(|u| {
                self.recipient_id == u && !self.is_read && self.status == MessageStatus::Delivered
            }),
        }
    }

    /// Payload for the `updated` real-time event emitted on anchoring
    /// progress.
    pub fn status_payload(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "status": self.status,
            "blockchain_status": self.anchor_status,
            "is_read": self.is_read,
            "read_at": self.read_at,
        })
    }

    /// Payload for the read-receipt event; deliberately a different shape
    /// from `status_payload` so clients can tell the two apart.
    pub fn read_receipt_payload(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "status": self.status,
            "is_read": self.is_read,
            "read_at": self.read_at,
            "reader_id": self.recipient_id,
        })
    }
}

fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// API projection of a message. The wire name for the durability state stays
/// `blockchain_status` for client compatibility.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content_type: String,
    pub size: i64,
    pub blob_address: Option<String>,
    pub ledger_commitment: Option<String>,
    pub blockchain_status: AnchorStatus,
    pub status: MessageStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_revoke: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_mark_as_read: Option<bool>,
}

/// Denormalized record kept in the metadata side index. Advisory and
/// queryable, never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub blob_address: Option<String>,
    pub ledger_commitment: Option<String>,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: String,
}
