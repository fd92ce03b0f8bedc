//! Ledger gateway client: commitment construction, transaction submission,
//! bounded receipt polling, revocation and verification.
//!
//! Gas/fee policy and confirmation depth are the gateway's concern; this
//! client only submits and waits.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

use super::{Ledger, Receipt};

/// Deterministic commitment over the ordered tuple (sender reference,
/// recipient reference, blob address). The ordering and algorithm are part
/// of the external contract: any verifier must be able to re-derive the same
/// value independently.
pub fn build_commitment(sender_ref: &str, recipient_ref: &str, blob_address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sender_ref.as_bytes());
    hasher.update(recipient_ref.as_bytes());
    hasher.update(blob_address.as_bytes());
    hex::encode(hasher.finalize())
}

/// Configuration for the ledger gateway client.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub endpoint: String,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Upper bound on the total receipt wait. A timed-out wait is an attempt
    /// failure; it must never leave a message in `storing` indefinitely.
    pub receipt_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("LEDGER_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            poll_interval: Duration::from_secs(
                std::env::var("LEDGER_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
            ),
            receipt_timeout: Duration::from_secs(
                std::env::var("LEDGER_RECEIPT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }
}

pub struct LedgerGateway {
    http: reqwest::Client,
    config: LedgerConfig,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx: String,
}

#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verified: bool,
}

impl LedgerGateway {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        info!(endpoint = %config.endpoint, "Initializing ledger gateway client");

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build ledger HTTP client")?;

        Ok(Self { http, config })
    }

    async fn submit(&self, body: serde_json::Value) -> Result<String> {
        let response: SubmitResponse = self
            .http
            .post(format!("{}/transactions", self.config.endpoint))
            .json(&body)
            .send()
            .await
            .context("Ledger transaction submission failed")?
            .error_for_status()
            .context("Ledger rejected the transaction submission")?
            .json()
            .await
            .context("Ledger returned an unexpected submission body")?;

        Ok(response.tx)
    }

    async fn poll_receipt(&self, tx_ref: &str) -> Result<Receipt> {
        loop {
            let response = self
                .http
                .get(format!(
                    "{}/transactions/{}/receipt",
                    self.config.endpoint, tx_ref
                ))
                .send()
                .await
                .context("Ledger receipt poll failed")?;

            // Not yet included.
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            let receipt: ReceiptResponse = response
                .error_for_status()
                .context("Ledger receipt poll returned an error status")?
                .json()
                .await
                .context("Ledger returned an unexpected receipt body")?;

            debug!(tx = %tx_ref, status = %receipt.status, "Ledger receipt");
            return Ok(Receipt {
                success: receipt.status == "0x1",
            });
        }
    }
}

#[async_trait]
impl Ledger for LedgerGateway {
    async fn commit(
        &self,
        commitment: &str,
        recipient_ref: &str,
        sender_ref: &str,
    ) -> Result<String> {
        let tx = self
            .submit(json!({
                "op": "store",
                "commitment": commitment,
                "recipient": recipient_ref,
                "from": sender_ref,
            }))
            .await?;

        debug!(tx = %tx, "Submitted commitment transaction");
        Ok(tx)
    }

    async fn await_receipt(&self, tx_ref: &str) -> Result<Receipt> {
        match tokio::time::timeout(self.config.receipt_timeout, self.poll_receipt(tx_ref)).await {
            Ok(receipt) => receipt,
            Err(_) => bail!(
                "timed out after {:?} waiting for receipt of {}",
                self.config.receipt_timeout,
                tx_ref
            ),
        }
    }

    async fn revoke(&self, commitment: &str) -> Result<String> {
        let tx = self
            .submit(json!({
                "op": "revoke",
                "commitment": commitment,
            }))
            .await?;

        debug!(tx = %tx, "Submitted revocation transaction");
        Ok(tx)
    }

    async fn verify(&self, commitment: &str) -> Result<bool> {
        let response: VerifyResponse = self
            .http
            .get(format!(
                "{}/commitments/{}/verify",
                self.config.endpoint, commitment
            ))
            .send()
            .await
            .context("Ledger verify request failed")?
            .error_for_status()
            .context("Ledger verify returned an error status")?
            .json()
            .await
            .context("Ledger returned an unexpected verify body")?;

        Ok(response.verified)
    }
}
