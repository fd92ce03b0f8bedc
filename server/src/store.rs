//! `MessageStore`: the persistence seam the pipeline and jobs run against.
//!
//! The message row is the single source of truth; every transition here is a
//! compare-and-set keyed on the expected prior state, so concurrent
//! schedulings of the same message cannot produce lost updates. `PgStore` is
//! the production implementation over `db`; tests inject an in-memory double.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{self, DbPool};
use crate::models::Message;

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Message>>;

    /// Persist the blob address checkpoint and move to `storing`.
    /// Returns false when the address was already set or the message is
    /// terminal.
    async fn record_blob_address(&self, id: &str, address: &str) -> Result<bool>;

    /// Persist the ledger commitment, move to `stored`, deliver.
    /// Returns false unless the message is still pending with no commitment.
    async fn record_anchored(&self, id: &str, commitment: &str) -> Result<bool>;

    /// Mark the attempt failed; never demotes `stored` or `failed`.
    async fn mark_anchor_failed(&self, id: &str) -> Result<bool>;

    /// Set `is_read`/`read_at`/`status` together, exactly once.
    /// Returns false unless the message is delivered and unread.
    async fn mark_read(&self, id: &str, read_at: DateTime<Utc>) -> Result<bool>;

    /// Transition to `revoked`; no-op on terminal messages.
    async fn mark_revoked(&self, id: &str) -> Result<bool>;

    async fn expired_batch(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Message>>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Production store backed by the Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn get(&self, id: &str) -> Result<Option<Message>> {
        db::get_message(&self.pool, id).await
    }

    async fn record_blob_address(&self, id: &str, address: &str) -> Result<bool> {
        db::record_blob_address(&self.pool, id, address).await
    }

    async fn record_anchored(&self, id: &str, commitment: &str) -> Result<bool> {
        db::record_anchored(&self.pool, id, commitment).await
    }

    async fn mark_anchor_failed(&self, id: &str) -> Result<bool> {
        db::mark_anchor_failed(&self.pool, id).await
    }

    async fn mark_read(&self, id: &str, read_at: DateTime<Utc>) -> Result<bool> {
        db::mark_read(&self.pool, id, read_at).await
    }

    async fn mark_revoked(&self, id: &str) -> Result<bool> {
        db::mark_revoked(&self.pool, id).await
    }

    async fn expired_batch(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Message>> {
        db::expired_batch(&self.pool, now, limit).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        db::delete_message(&self.pool, id).await
    }
}
