//! REST client for the metadata side index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::MetadataIndex;
use crate::models::IndexRecord;

/// Configuration for the metadata index client.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("INDEX_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9200".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("INDEX_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

pub struct HttpIndex {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DeleteExpiredResponse {
    deleted: u64,
}

impl HttpIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        info!(base_url = %config.base_url, "Initializing metadata index client");

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build index HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }
}

#[async_trait]
impl MetadataIndex for HttpIndex {
    async fn upsert(&self, record: &IndexRecord) -> Result<()> {
        self.http
            .put(format!("{}/messages/{}", self.base_url, record.message_id))
            .json(record)
            .send()
            .await
            .context("Index upsert request failed")?
            .error_for_status()
            .context("Index upsert returned an error status")?;

        debug!(message_id = %record.message_id, "Upserted index record");
        Ok(())
    }

    async fn set_status(&self, message_id: &str, status: &str) -> Result<()> {
        self.http
            .patch(format!("{}/messages/{}", self.base_url, message_id))
            .json(&json!({ "status": status, "updated_at": Utc::now() }))
            .send()
            .await
            .context("Index status update failed")?
            .error_for_status()
            .context("Index status update returned an error status")?;

        debug!(message_id = %message_id, status = %status, "Updated index record status");
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let response: DeleteExpiredResponse = self
            .http
            .delete(format!("{}/messages/expired", self.base_url))
            .query(&[("before", cutoff.to_rfc3339())])
            .send()
            .await
            .context("Index expired-delete request failed")?
            .error_for_status()
            .context("Index expired-delete returned an error status")?
            .json()
            .await
            .context("Index returned an unexpected expired-delete body")?;

        debug!(deleted = response.deleted, "Deleted expired index records");
        Ok(response.deleted)
    }

    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<IndexRecord>> {
        let records: Vec<IndexRecord> = self
            .http
            .get(format!("{}/messages", self.base_url))
            .query(&[("participant", user_id)])
            .send()
            .await
            .context("Index participant query failed")?
            .error_for_status()
            .context("Index participant query returned an error status")?
            .json()
            .await
            .context("Index returned an unexpected participant-query body")?;

        Ok(records)
    }
}
