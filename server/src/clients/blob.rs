//! IPFS-backed blob store client over the HTTP API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::BlobStore;

/// Configuration for the IPFS HTTP API client.
#[derive(Debug, Clone)]
pub struct IpfsConfig {
    pub api_url: String,
    pub request_timeout: Duration,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("IPFS_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("IPFS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsClient {
    pub fn new(config: IpfsConfig) -> Result<Self> {
        info!(api_url = %config.api_url, "Initializing IPFS blob store client");

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build IPFS HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{}", self.api_url, path)
    }
}

#[async_trait]
impl BlobStore for IpfsClient {
    async fn put(&self, data: &[u8]) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name("blob");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response: AddResponse = self
            .http
            .post(self.endpoint("add"))
            .multipart(form)
            .send()
            .await
            .context("IPFS add request failed")?
            .error_for_status()
            .context("IPFS add returned an error status")?
            .json()
            .await
            .context("IPFS add returned an unexpected body")?;

        debug!(address = %response.hash, size = data.len(), "Stored blob");
        Ok(response.hash)
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .post(self.endpoint("cat"))
            .query(&[("arg", address)])
            .send()
            .await
            .context("IPFS cat request failed")?
            .error_for_status()
            .context("IPFS cat returned an error status")?
            .bytes()
            .await
            .context("Failed to read blob body")?;

        debug!(address = %address, size = bytes.len(), "Fetched blob");
        Ok(bytes.to_vec())
    }

    async fn pin(&self, address: &str) -> Result<()> {
        self.http
            .post(self.endpoint("pin/add"))
            .query(&[("arg", address)])
            .send()
            .await
            .context("IPFS pin request failed")?
            .error_for_status()
            .context("IPFS pin returned an error status")?;

        debug!(address = %address, "Pinned blob");
        Ok(())
    }

    async fn unpin(&self, address: &str) -> Result<()> {
        self.http
            .post(self.endpoint("pin/rm"))
            .query(&[("arg", address)])
            .send()
            .await
            .context("IPFS unpin request failed")?
            .error_for_status()
            .context("IPFS unpin returned an error status")?;

        debug!(address = %address, "Unpinned blob");
        Ok(())
    }
}
