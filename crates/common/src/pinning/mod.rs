//! IPFS pinning client abstraction
//!
//! Uploads an in-memory payload and returns its content identifier plus a
//! gateway URL. Re-pinning identical bytes is safe: the store deduplicates by
//! content address. No automatic retries; the pipeline step is re-triggered
//! by the caller instead.

use crate::config::PinningConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// A payload to pin
#[derive(Debug, Clone)]
pub struct PinRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl PinRequest {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            content_type: content_type.into(),
        }
    }

    /// Pin already-serialized JSON bytes without re-encoding them
    pub fn json(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self::new(bytes, file_name, "application/json")
    }
}

/// Result of a successful pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedContent {
    pub cid: String,
    pub gateway_url: String,
    pub size: usize,
}

impl PinnedContent {
    pub fn uri(&self) -> String {
        format!("ipfs://{}", self.cid)
    }
}

/// Trait for content-addressed uploads
#[async_trait]
pub trait PinningService: Send + Sync {
    async fn pin(&self, request: PinRequest) -> Result<PinnedContent>;

    /// Provider name for logs and metrics
    fn name(&self) -> &str;

    /// Gateway base used for returned URLs
    fn gateway_base(&self) -> &str;
}

/// Join a gateway base and a CID
pub fn gateway_url(base: &str, cid: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), cid)
}

/// Turn `ipfs://`, bare CIDs, or existing URLs into a browsable URL
pub fn convert_ipfs_to_gateway(reference: &str, base: &str) -> String {
    let reference = reference.trim();
    if let Some(cid) = reference.strip_prefix("ipfs://") {
        return gateway_url(base, cid.trim_start_matches("ipfs/"));
    }
    if reference.starts_with("Qm") || reference.starts_with("bafy") || reference.starts_with("bafk") {
        return gateway_url(base, reference);
    }
    reference.to_string()
}

#[derive(Deserialize)]
struct PinataResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pin_size: Option<u64>,
}

/// Pinata `pinFileToIPFS` client
pub struct PinataClient {
    client: reqwest::Client,
    jwt: String,
    api_base: String,
    gateway_base: String,
}

impl PinataClient {
    pub fn new(config: &PinningConfig) -> Result<Self> {
        let jwt = config
            .jwt
            .clone()
            .filter(|j| !j.trim().is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "pinning.jwt is required for the pinata provider".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            jwt,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            gateway_base: config.gateway_base.clone(),
        })
    }
}

#[async_trait]
impl PinningService for PinataClient {
    async fn pin(&self, request: PinRequest) -> Result<PinnedContent> {
        let size = request.bytes.len();
        let url = format!("{}/pinning/pinFileToIPFS", self.api_base);

        let file = Part::bytes(request.bytes)
            .file_name(request.file_name.clone())
            .mime_str(&request.content_type)?;
        let metadata = serde_json::json!({ "name": request.file_name }).to_string();
        let form = Form::new()
            .part("file", file)
            .text("pinataMetadata", metadata);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Pinning {
                message: format!("Upload of {} failed: {}", request.file_name, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Pinning {
                message: format!("Pinata error {} for {}: {}", status, request.file_name, body),
            });
        }

        let result: PinataResponse = response.json().await.map_err(|e| AppError::Pinning {
            message: format!("Failed to parse Pinata response: {}", e),
        })?;

        info!(
            cid = %result.ipfs_hash,
            file = %request.file_name,
            pin_size = result.pin_size.unwrap_or(size as u64),
            "Pinned to IPFS"
        );

        Ok(PinnedContent {
            gateway_url: gateway_url(&self.gateway_base, &result.ipfs_hash),
            cid: result.ipfs_hash,
            size,
        })
    }

    fn name(&self) -> &str {
        "pinata"
    }

    fn gateway_base(&self) -> &str {
        &self.gateway_base
    }
}

/// Mock pinning for testing
///
/// Content addressed: identical bytes always yield the same CID.
pub struct MockPinning {
    gateway_base: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    next_failure: Mutex<Option<String>>,
}

impl MockPinning {
    pub fn new(gateway_base: impl Into<String>) -> Self {
        Self {
            gateway_base: gateway_base.into(),
            objects: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    /// CID the mock assigns to a payload
    pub fn cid_for(bytes: &[u8]) -> String {
        format!("bafkrei{}", &hex::encode(Sha256::digest(bytes))[..52])
    }

    /// Make the next upload fail with this message
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(message.into());
        }
    }

    /// File names uploaded so far, in order
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn get(&self, cid: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok().and_then(|o| o.get(cid).cloned())
    }
}

impl Default for MockPinning {
    fn default() -> Self {
        Self::new("https://gateway.pinata.cloud/ipfs")
    }
}

#[async_trait]
impl PinningService for MockPinning {
    async fn pin(&self, request: PinRequest) -> Result<PinnedContent> {
        if let Some(message) = self.next_failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(AppError::Pinning { message });
        }

        let cid = Self::cid_for(&request.bytes);
        let size = request.bytes.len();
        debug!(cid = %cid, file = %request.file_name, size, "Mock pin");

        self.objects
            .lock()
            .map_err(|_| poisoned())?
            .insert(cid.clone(), request.bytes);
        self.uploads
            .lock()
            .map_err(|_| poisoned())?
            .push(request.file_name);

        Ok(PinnedContent {
            gateway_url: gateway_url(&self.gateway_base, &cid),
            cid,
            size,
        })
    }

    fn name(&self) -> &str {
        "mock-pinning"
    }

    fn gateway_base(&self) -> &str {
        &self.gateway_base
    }
}

fn poisoned() -> AppError {
    AppError::Internal {
        message: "mock pinning state poisoned".to_string(),
    }
}

/// Create a pinning service based on configuration
pub fn create_pinning_service(config: &PinningConfig) -> Result<Arc<dyn PinningService>> {
    match config.provider.as_str() {
        "pinata" => Ok(Arc::new(PinataClient::new(config)?)),
        "mock" => Ok(Arc::new(MockPinning::new(config.gateway_base.clone()))),
        other => Err(AppError::Configuration {
            message: format!("Unknown pinning provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_helpers() {
        let base = "https://gateway.pinata.cloud/ipfs/";
        assert_eq!(gateway_url(base, "QmX"), "https://gateway.pinata.cloud/ipfs/QmX");
        assert_eq!(
            convert_ipfs_to_gateway("ipfs://QmX", "https://ipfs.io/ipfs"),
            "https://ipfs.io/ipfs/QmX"
        );
        assert_eq!(
            convert_ipfs_to_gateway("bafybeigd", "https://ipfs.io/ipfs"),
            "https://ipfs.io/ipfs/bafybeigd"
        );
        assert_eq!(
            convert_ipfs_to_gateway("https://example.org/a.png", "https://ipfs.io/ipfs"),
            "https://example.org/a.png"
        );
    }

    #[test]
    fn test_pinata_requires_jwt() {
        let config = PinningConfig::default();
        assert!(matches!(
            PinataClient::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_is_content_addressed() {
        let pinning = MockPinning::default();
        let a = pinning
            .pin(PinRequest::json(b"{\"a\":1}".to_vec(), "a.json"))
            .await
            .unwrap();
        let b = pinning
            .pin(PinRequest::json(b"{\"a\":1}".to_vec(), "again.json"))
            .await
            .unwrap();

        assert_eq!(a.cid, b.cid);
        assert_eq!(a.uri(), format!("ipfs://{}", a.cid));
        assert!(a.gateway_url.ends_with(&a.cid));
        assert_eq!(pinning.get(&a.cid).unwrap(), b"{\"a\":1}".to_vec());
        assert_eq!(pinning.uploads(), vec!["a.json", "again.json"]);
    }

    #[tokio::test]
    async fn test_mock_failure_is_terminal_for_the_call() {
        let pinning = MockPinning::default();
        pinning.fail_next("503 Service Unavailable");

        let err = pinning
            .pin(PinRequest::new(vec![1, 2, 3], "cover.png", "image/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Pinning { .. }));
        assert!(pinning.uploads().is_empty());

        assert!(pinning
            .pin(PinRequest::new(vec![1, 2, 3], "cover.png", "image/png"))
            .await
            .is_ok());
    }
}
