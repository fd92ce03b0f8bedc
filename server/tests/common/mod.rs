//! In-memory doubles for the store and the three external clients.
//!
//! The fakes record every call so tests can assert exactly which external
//! operations an orchestration path performed. `MemoryStore` mirrors the
//! conditional-update contract of the Postgres store: every transition
//! checks the same preconditions and reports whether a row changed.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use cachet_server::clients::{BlobStore, Ledger, MetadataIndex, Receipt};
use cachet_server::models::{AnchorStatus, IndexRecord, Message, MessageStatus};
use cachet_server::pipeline::AnchorPipeline;
use cachet_server::realtime::EventBus;
use cachet_server::store::MessageStore;

// ---------------------------------------------------------------------------
// Message fixtures
// ---------------------------------------------------------------------------

pub fn new_message(id: &str, sender: &str, recipient: &str) -> Message {
    let now = Utc::now();
    Message {
        id: id.to_string(),
        sender_id: sender.to_string(),
        recipient_id: recipient.to_string(),
        encrypted_content: format!("ciphertext-{id}").into_bytes(),
        content_type: "text".to_string(),
        size: 16,
        blob_address: None,
        ledger_commitment: None,
        anchor_status: AnchorStatus::NotStored,
        status: MessageStatus::Pending,
        is_read: false,
        read_at: None,
        expires_at: None,
        metadata: serde_json::json!({
            "created_timestamp": now.timestamp(),
            "sender_address": format!("0x{sender}"),
            "recipient_address": format!("0x{recipient}"),
        }),
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<HashMap<String, Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, message: Message) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
    }

    pub fn get_sync(&self, id: &str) -> Option<Message> {
        self.messages.lock().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.lock().unwrap().contains_key(id)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Message>> {
        Ok(self.get_sync(id))
    }

    async fn record_blob_address(&self, id: &str, address: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(id) {
            Some(msg) if msg.blob_address.is_none() && !msg.status.is_terminal() => {
                msg.blob_address = Some(address.to_string());
                msg.anchor_status = AnchorStatus::Storing;
                msg.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_anchored(&self, id: &str, commitment: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(id) {
            Some(msg)
                if msg.ledger_commitment.is_none() && msg.status == MessageStatus::Pending =>
            {
                msg.ledger_commitment = Some(commitment.to_string());
                msg.anchor_status = AnchorStatus::Stored;
                msg.status = MessageStatus::Delivered;
                msg.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_anchor_failed(&self, id: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(id) {
            Some(msg)
                if matches!(
                    msg.anchor_status,
                    AnchorStatus::NotStored | AnchorStatus::Storing
                ) =>
            {
                msg.anchor_status = AnchorStatus::Failed;
                msg.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_read(&self, id: &str, read_at: DateTime<Utc>) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(id) {
            Some(msg) if !msg.is_read && msg.status == MessageStatus::Delivered => {
                msg.is_read = true;
                msg.read_at = Some(read_at);
                msg.status = MessageStatus::Read;
                msg.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_revoked(&self, id: &str) -> Result<bool> {
        let mut messages = self.messages.lock().unwrap();
        match messages.get_mut(id) {
            Some(msg) if !msg.status.is_terminal() => {
                msg.status = MessageStatus::Revoked;
                msg.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expired_batch(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Message>> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .values()
            .filter(|m| m.is_expired(now))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.messages.lock().unwrap().remove(id).is_some())
    }
}

// ---------------------------------------------------------------------------
// RevokeRacingStore
// ---------------------------------------------------------------------------

/// Which checkpoint write a concurrent revoke beats to the row.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RaceAt {
    BlobCheckpoint,
    AnchorCheckpoint,
}

/// Store that revokes the message just before the chosen checkpoint write,
/// simulating a revoke landing between an external-store call and its
/// conditional update.
pub struct RevokeRacingStore {
    inner: Arc<MemoryStore>,
    race_at: RaceAt,
    fired: AtomicBool,
}

impl RevokeRacingStore {
    pub fn new(inner: Arc<MemoryStore>, race_at: RaceAt) -> Self {
        Self {
            inner,
            race_at,
            fired: AtomicBool::new(false),
        }
    }

    async fn maybe_revoke(&self, at: RaceAt, id: &str) -> Result<()> {
        if self.race_at == at && !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.mark_revoked(id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for RevokeRacingStore {
    async fn get(&self, id: &str) -> Result<Option<Message>> {
        self.inner.get(id).await
    }

    async fn record_blob_address(&self, id: &str, address: &str) -> Result<bool> {
        self.maybe_revoke(RaceAt::BlobCheckpoint, id).await?;
        self.inner.record_blob_address(id, address).await
    }

    async fn record_anchored(&self, id: &str, commitment: &str) -> Result<bool> {
        self.maybe_revoke(RaceAt::AnchorCheckpoint, id).await?;
        self.inner.record_anchored(id, commitment).await
    }

    async fn mark_anchor_failed(&self, id: &str) -> Result<bool> {
        self.inner.mark_anchor_failed(id).await
    }

    async fn mark_read(&self, id: &str, read_at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_read(id, read_at).await
    }

    async fn mark_revoked(&self, id: &str) -> Result<bool> {
        self.inner.mark_revoked(id).await
    }

    async fn expired_batch(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Message>> {
        self.inner.expired_batch(now, limit).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
}

// ---------------------------------------------------------------------------
// FakeBlobStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBlobStore {
    pub puts: Mutex<Vec<Vec<u8>>>,
    pub pins: Mutex<Vec<String>>,
    pub unpins: Mutex<Vec<String>>,
    pub fail_puts: AtomicBool,
    pub fail_unpins: AtomicBool,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content-addressed like the real store: the address is derived from
    /// the bytes.
    pub fn address_for(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        format!("Qm{}", &hex::encode(digest)[..32])
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn unpinned(&self) -> Vec<String> {
        self.unpins.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(&self, data: &[u8]) -> Result<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("blob store unreachable");
        }
        self.puts.lock().unwrap().push(data.to_vec());
        Ok(Self::address_for(data))
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>> {
        let puts = self.puts.lock().unwrap();
        puts.iter()
            .find(|data| Self::address_for(data) == address)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("blob {address} not found"))
    }

    async fn pin(&self, address: &str) -> Result<()> {
        self.pins.lock().unwrap().push(address.to_string());
        Ok(())
    }

    async fn unpin(&self, address: &str) -> Result<()> {
        if self.fail_unpins.load(Ordering::SeqCst) {
            bail!("blob store unreachable");
        }
        self.unpins.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeLedger
// ---------------------------------------------------------------------------

pub struct FakeLedger {
    pub commits: Mutex<Vec<String>>,
    pub revokes: Mutex<Vec<String>>,
    /// Receipt outcome for included transactions.
    pub receipt_success: AtomicBool,
    /// Simulate a confirmation wait that times out.
    pub fail_receipts: AtomicBool,
    pub fail_commits: AtomicBool,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self {
            commits: Mutex::new(Vec::new()),
            revokes: Mutex::new(Vec::new()),
            receipt_success: AtomicBool::new(true),
            fail_receipts: AtomicBool::new(false),
            fail_commits: AtomicBool::new(false),
        }
    }
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revokes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn commit(
        &self,
        commitment: &str,
        _recipient_ref: &str,
        _sender_ref: &str,
    ) -> Result<String> {
        if self.fail_commits.load(Ordering::SeqCst) {
            bail!("ledger unreachable");
        }
        let mut commits = self.commits.lock().unwrap();
        commits.push(commitment.to_string());
        Ok(format!("tx-{}", commits.len()))
    }

    async fn await_receipt(&self, tx_ref: &str) -> Result<Receipt> {
        if self.fail_receipts.load(Ordering::SeqCst) {
            bail!("timed out waiting for receipt of {tx_ref}");
        }
        Ok(Receipt {
            success: self.receipt_success.load(Ordering::SeqCst),
        })
    }

    async fn revoke(&self, commitment: &str) -> Result<String> {
        let mut revokes = self.revokes.lock().unwrap();
        revokes.push(commitment.to_string());
        Ok(format!("rtx-{}", revokes.len()))
    }

    async fn verify(&self, commitment: &str) -> Result<bool> {
        let committed = self.commits.lock().unwrap().contains(&commitment.to_string());
        let revoked = self.revokes.lock().unwrap().contains(&commitment.to_string());
        Ok(committed && !revoked)
    }
}

// ---------------------------------------------------------------------------
// FakeIndex
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIndex {
    pub records: Mutex<HashMap<String, IndexRecord>>,
    pub status_updates: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<(String, String)> {
        self.status_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataIndex for FakeIndex {
    async fn upsert(&self, record: &IndexRecord) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("index unreachable");
        }
        self.records
            .lock()
            .unwrap()
            .insert(record.message_id.clone(), record.clone());
        Ok(())
    }

    async fn set_status(&self, message_id: &str, status: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("index unreachable");
        }
        if let Some(record) = self.records.lock().unwrap().get_mut(message_id) {
            record.status = status.to_string();
        }
        self.status_updates
            .lock()
            .unwrap()
            .push((message_id.to_string(), status.to_string()));
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at.map(|at| at >= cutoff).unwrap_or(true));
        Ok((before - records.len()) as u64)
    }

    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<IndexRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.sender_id == user_id || r.recipient_id == user_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<FakeBlobStore>,
    pub ledger: Arc<FakeLedger>,
    pub index: Arc<FakeIndex>,
    pub events: Arc<EventBus>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            blobs: Arc::new(FakeBlobStore::new()),
            ledger: Arc::new(FakeLedger::new()),
            index: Arc::new(FakeIndex::new()),
            events: Arc::new(EventBus::new(64)),
        }
    }

    pub fn pipeline(&self) -> AnchorPipeline {
        self.pipeline_with_store(self.store.clone())
    }

    pub fn pipeline_with_store(&self, store: Arc<dyn MessageStore>) -> AnchorPipeline {
        AnchorPipeline::new(
            store,
            self.blobs.clone(),
            self.ledger.clone(),
            self.index.clone(),
            self.events.clone(),
        )
    }
}
