use serde::{Deserialize, Serialize};

use super::{ContentHash, ContentStore, StoreError};
use crate::config::StoreConfig;

/// HTTP client for a Pinata-style pinning service plus its read gateway.
///
/// Uploads go to `pin_url` as multipart `file` parts named
/// `{folder}/{entry}`; reads go to `{gateway_url}{hash}/{entry}`.
pub struct PinataStore {
    config: StoreConfig,
    client: reqwest::Client,
}

/// Response body from `pinFileToIPFS`
#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

#[derive(Serialize)]
struct PinataMetadata<'a> {
    name: &'a str,
}

impl PinataStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::StoreUnavailable(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn gateway_url(&self, hash: &ContentHash, entry: &str) -> String {
        let base = self.config.gateway_url.trim_end_matches('/');
        format!("{base}/{hash}/{entry}")
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::StoreUnavailable(format!(
                "Request timed out after {}s",
                self.config.timeout.as_secs()
            ))
        } else if e.is_connect() {
            StoreError::StoreUnavailable("Cannot connect to content store".into())
        } else {
            StoreError::StoreUnavailable(e.to_string())
        }
    }
}

/// Auth and quota failures are rejections; server-side failures are transient.
fn classify_status(status: reqwest::StatusCode, body: String) -> StoreError {
    if status.is_server_error() {
        StoreError::StoreUnavailable(format!("status {}: {body}", status.as_u16()))
    } else {
        StoreError::StoreRejected {
            status: status.as_u16(),
            body,
        }
    }
}

impl ContentStore for PinataStore {
    async fn put_entry(
        &self,
        folder: &str,
        entry: &str,
        bytes: Vec<u8>,
    ) -> Result<ContentHash, StoreError> {
        let mime = mime_guess::from_path(entry).first_or_octet_stream();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("{folder}/{entry}"))
            .mime_str(mime.essence_str())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let metadata = serde_json::to_string(&PinataMetadata { name: folder })
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Pinata needs the literal `folder/entry` path, so no percent-encoding.
        let form = reqwest::multipart::Form::new()
            .percent_encode_noop()
            .part("file", part)
            .text("pinataMetadata", metadata);

        let response = self
            .client
            .post(&self.config.pin_url)
            .bearer_auth(&self.config.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Pinning request failed");
            return Err(classify_status(status, body));
        }

        let parsed: PinResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        let hash = ContentHash::new(parsed.ipfs_hash)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        tracing::debug!(hash = %hash, "Pinned entry");
        Ok(hash)
    }

    async fn get_entry(&self, hash: &ContentHash, entry: &str) -> Result<Vec<u8>, StoreError> {
        let response = self
            .client
            .get(self.gateway_url(hash, entry))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(hash.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(hash = %hash, status = status.as_u16(), "Gateway fetch failed");
            return Err(classify_status(status, body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }
}
