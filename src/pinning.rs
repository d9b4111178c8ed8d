//! Certificate upload client
//!
//! Thin client for a Pinata-style pin-file endpoint. Certificates and
//! inspection acts are pinned before the referencing transaction is
//! submitted; the returned gateway reference is what goes on the ledger.
//! Failures collapse to one human-readable message and are never retried.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

pub struct PinningClient {
    http: reqwest::Client,
    endpoint: String,
    gateway: String,
    jwt: String,
}

impl PinningClient {
    pub fn new(endpoint: &str, gateway: &str, jwt: &str) -> Result<Self> {
        if jwt.trim().is_empty() {
            return Err(Error::Config(
                "Pinning JWT is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            gateway: gateway.trim_end_matches('/').to_string(),
            jwt: jwt.to_string(),
        })
    }

    /// Pin a local file and return its gateway content reference.
    pub async fn pin_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.pin_bytes(name, bytes).await
    }

    /// Pin raw bytes under the given file name.
    pub async fn pin_bytes(&self, name: String, bytes: Vec<u8>) -> Result<String> {
        debug!("Pinning {} ({} bytes)", name, bytes.len());
        let part = multipart::Part::bytes(bytes).file_name(name);
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!(
                "Pinning service returned {status}: {body}"
            )));
        }

        let pinned: PinResponse = response.json().await?;
        let reference = self.gateway_ref(&pinned.ipfs_hash);
        info!("Pinned content at {}", reference);
        Ok(reference)
    }

    fn gateway_ref(&self, hash: &str) -> String {
        format!("{}/ipfs/{}", self.gateway, hash)
    }
}
