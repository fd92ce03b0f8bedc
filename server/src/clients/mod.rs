//! Contracts for the three external stores the pipeline drives.
//!
//! The pipeline does not care how these are transported; it treats any
//! failure as attempt failure. Production implementations are thin HTTP
//! clients; tests inject recording fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::IndexRecord;

pub mod blob;
pub mod index;
pub mod ledger;

pub use blob::{IpfsClient, IpfsConfig};
pub use index::{HttpIndex, IndexConfig};
pub use ledger::{build_commitment, LedgerConfig, LedgerGateway};

/// Outcome of a ledger transaction once included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
}

/// Content-addressed storage for opaque encrypted blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob; returns its content address.
    async fn put(&self, data: &[u8]) -> Result<String>;

    async fn get(&self, address: &str) -> Result<Vec<u8>>;

    /// Pin the blob so it survives garbage collection.
    async fn pin(&self, address: &str) -> Result<()>;

    async fn unpin(&self, address: &str) -> Result<()>;
}

/// Append-only ledger anchoring commitments to blob addresses.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit a commitment transaction; returns a transaction reference.
    async fn commit(
        &self,
        commitment: &str,
        recipient_ref: &str,
        sender_ref: &str,
    ) -> Result<String>;

    /// Block until the transaction is included or the bounded wait elapses.
    /// Implementations must not wait forever.
    async fn await_receipt(&self, tx_ref: &str) -> Result<Receipt>;

    /// Submit a revocation transaction for a previously stored commitment.
    async fn revoke(&self, commitment: &str) -> Result<String>;

    /// Whether the ledger currently verifies the commitment.
    async fn verify(&self, commitment: &str) -> Result<bool>;
}

/// Advisory, queryable side index of message metadata. Never authoritative;
/// callers log and swallow its failures.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    async fn upsert(&self, record: &IndexRecord) -> Result<()>;

    async fn set_status(&self, message_id: &str, status: &str) -> Result<()>;

    /// Drop index records whose expiry is before the cutoff; returns the
    /// number removed.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<IndexRecord>>;
}
