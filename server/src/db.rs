//! Connection pool setup and row operations for messages and users.
//!
//! Every state transition is a conditional UPDATE keyed on the expected prior
//! state and returns whether a row was actually changed. The message row is
//! the single synchronization point between the web layer, the anchoring
//! pipeline, and the expiry sweep; there are no in-memory locks.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{Message, User};

pub type DbPool = PgPool;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/cachet".to_string()),
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Initialize database connection pool with configuration
pub async fn init_db(config: DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}

/// Initialize database with default configuration
pub async fn init_db_default() -> Result<DbPool> {
    init_db(DbConfig::default()).await
}

// =============================================================================
// User operations
// =============================================================================

pub async fn get_user(pool: &DbPool, id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch user")?;

    Ok(user)
}

/// Insert a user row. Only used by dev seeding and tests; real users are
/// provisioned by the external auth service.
pub async fn create_user(
    pool: &DbPool,
    username: &str,
    ledger_address: &str,
    public_key: &str,
) -> Result<User> {
    let id = Uuid::new_v4().to_string();

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, username, ledger_address, public_key)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(&id)
    .bind(username)
    .bind(ledger_address)
    .bind(public_key)
    .fetch_one(pool)
    .await
    .context("Failed to create user")?;

    Ok(user)
}

// =============================================================================
// Message operations
// =============================================================================

/// Create a message row in its initial state (`pending` / `not_stored`).
/// `metadata` is set exactly once here and captures the participant ledger
/// addresses the pipeline needs for commitment construction.
pub async fn create_message(
    pool: &DbPool,
    sender: &User,
    recipient: &User,
    encrypted_content: Vec<u8>,
    content_type: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<Message> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let metadata = serde_json::json!({
        "created_timestamp": now.timestamp(),
        "sender_address": sender.ledger_address,
        "recipient_address": recipient.ledger_address,
    });
    let size = encrypted_content.len() as i64;

    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages
            (id, sender_id, recipient_id, encrypted_content, content_type, size,
             expires_at, metadata, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
         RETURNING *",
    )
    .bind(&id)
    .bind(&sender.id)
    .bind(&recipient.id)
    .bind(&encrypted_content)
    .bind(content_type)
    .bind(size)
    .bind(expires_at)
    .bind(&metadata)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("Failed to create message")?;

    Ok(message)
}

pub async fn get_message(pool: &DbPool, id: &str) -> Result<Option<Message>> {
    let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch message")?;

    Ok(message)
}

/// All messages the user participates in, newest first.
pub async fn list_messages_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages
         WHERE sender_id = $1 OR recipient_id = $1
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list messages")?;

    Ok(messages)
}

/// Unread messages addressed to the user, newest first.
pub async fn unread_messages_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages
         WHERE recipient_id = $1 AND is_read = FALSE
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list unread messages")?;

    Ok(messages)
}

/// Owner-editable fields only; anchoring fields are never user-writable.
/// New metadata keys are merged over the existing map.
pub async fn update_message(
    pool: &DbPool,
    id: &str,
    expires_at: Option<DateTime<Utc>>,
    metadata: Option<serde_json::Value>,
) -> Result<Option<Message>> {
    let message = sqlx::query_as::<_, Message>(
        "UPDATE messages
         SET expires_at = COALESCE($2, expires_at),
             metadata = metadata || COALESCE($3, '{}'::jsonb),
             updated_at = NOW()
         WHERE id = $1 AND status NOT IN ('expired', 'revoked')
         RETURNING *",
    )
    .bind(id)
    .bind(expires_at)
    .bind(metadata)
    .fetch_optional(pool)
    .await
    .context("Failed to update message")?;

    Ok(message)
}

// =============================================================================
// State transitions (compare-and-set)
// =============================================================================

/// Durability checkpoint after a successful blob put: persist the content
/// address and move to `storing`. Fails the CAS if the address was already
/// set by an earlier attempt or the message reached a terminal state.
pub async fn record_blob_address(pool: &DbPool, id: &str, address: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE messages
         SET blob_address = $2, anchor_status = 'storing', updated_at = NOW()
         WHERE id = $1
           AND blob_address IS NULL
           AND status NOT IN ('expired', 'revoked')",
    )
    .bind(id)
    .bind(address)
    .execute(pool)
    .await
    .context("Failed to record blob address")?;

    Ok(result.rows_affected() > 0)
}

/// Final anchoring checkpoint after ledger confirmation: persist the
/// commitment, move to `stored` and deliver. Only a still-pending message
/// can complete anchoring.
pub async fn record_anchored(pool: &DbPool, id: &str, commitment: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE messages
         SET ledger_commitment = $2, anchor_status = 'stored',
             status = 'delivered', updated_at = NOW()
         WHERE id = $1
           AND ledger_commitment IS NULL
           AND status = 'pending'",
    )
    .bind(id)
    .bind(commitment)
    .execute(pool)
    .await
    .context("Failed to record anchoring")?;

    Ok(result.rows_affected() > 0)
}

/// Mark the anchoring attempt failed. Never moves a message out of `stored`
/// or `failed`, keeping the durability machine monotonic.
pub async fn mark_anchor_failed(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE messages
         SET anchor_status = 'failed', updated_at = NOW()
         WHERE id = $1 AND anchor_status IN ('not_stored', 'storing')",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to mark anchoring failed")?;

    Ok(result.rows_affected() > 0)
}

/// Mark-as-read: sets `is_read`, `read_at` and `status` together, exactly
/// once. Only a delivered message can be read; a still-pending message must
/// stay `pending` so anchoring completion can still claim it.
pub async fn mark_read(pool: &DbPool, id: &str, read_at: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE messages
         SET is_read = TRUE, read_at = $2, status = 'read', updated_at = NOW()
         WHERE id = $1
           AND is_read = FALSE
           AND status = 'delivered'",
    )
    .bind(id)
    .bind(read_at)
    .execute(pool)
    .await
    .context("Failed to mark message read")?;

    Ok(result.rows_affected() > 0)
}

/// Transition to `revoked`. No-op on an already-terminal message.
pub async fn mark_revoked(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE messages
         SET status = 'revoked', updated_at = NOW()
         WHERE id = $1 AND status NOT IN ('expired', 'revoked')",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to revoke message")?;

    Ok(result.rows_affected() > 0)
}

/// Batch of messages whose expiry has passed; order across messages is
/// unspecified.
pub async fn expired_batch(
    pool: &DbPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE expires_at <= $1 LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch expired messages")?;

    Ok(messages)
}

pub async fn delete_message(pool: &DbPool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete message")?;

    Ok(result.rows_affected() > 0)
}
