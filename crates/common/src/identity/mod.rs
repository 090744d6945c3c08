//! ORCID identity verification
//!
//! Exchanges an OAuth authorization code for the author's ORCID iD and
//! display name. The gateway stores the result on the caller's profile,
//! which is what unlocks the upload step.

use crate::auth::VerifiedIdentity;
use crate::config::OrcidConfig;
use crate::errors::{AppError, Result};
use crate::identifiers::parse_orcid_id;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Exchanges authorization codes for verified identities
#[async_trait]
pub trait OrcidClient: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<VerifiedIdentity>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    orcid: String,
    #[serde(default)]
    name: Option<String>,
}

/// ORCID OAuth token endpoint client
pub struct HttpOrcidClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl HttpOrcidClient {
    pub fn new(config: &OrcidConfig) -> Result<Self> {
        let client_id = config.client_id.clone().ok_or_else(|| AppError::Configuration {
            message: "orcid.client_id is required".to_string(),
        })?;
        let client_secret = config.client_secret.clone().ok_or_else(|| AppError::Configuration {
            message: "orcid.client_secret is required".to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            token_url: config.token_url.clone(),
        })
    }
}

#[async_trait]
impl OrcidClient for HttpOrcidClient {
    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<VerifiedIdentity> {
        if code.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "code".to_string(),
            });
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "ORCID token exchange rejected");
            return Err(AppError::Orcid {
                message: format!("Token exchange failed ({}): {}", status, body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| AppError::Orcid {
            message: format!("Malformed token response: {}", e),
        })?;

        let orcid_id = parse_orcid_id(&token.orcid)?;
        info!(orcid = %orcid_id, "ORCID identity verified");

        Ok(VerifiedIdentity {
            orcid_id,
            display_name: token.name.filter(|n| !n.trim().is_empty()),
        })
    }

    fn name(&self) -> &str {
        "orcid"
    }
}

/// Code → identity table for tests and local runs
#[derive(Default)]
pub struct MockOrcid {
    identities: Mutex<HashMap<String, VerifiedIdentity>>,
}

impl MockOrcid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `code` resolve to the given identity
    pub fn register(&self, code: impl Into<String>, orcid_id: &str, name: Option<&str>) {
        if let Ok(mut identities) = self.identities.lock() {
            identities.insert(
                code.into(),
                VerifiedIdentity {
                    orcid_id: orcid_id.to_string(),
                    display_name: name.map(str::to_string),
                },
            );
        }
    }
}

#[async_trait]
impl OrcidClient for MockOrcid {
    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<VerifiedIdentity> {
        let identities = self.identities.lock().map_err(|_| AppError::Internal {
            message: "ORCID mock lock poisoned".to_string(),
        })?;

        identities.get(code).cloned().ok_or_else(|| AppError::Orcid {
            message: "Token exchange failed (400 Bad Request): invalid_grant".to_string(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create the ORCID client selected by configuration
pub fn create_orcid_client(config: &OrcidConfig) -> Result<Arc<dyn OrcidClient>> {
    match config.provider.as_str() {
        "orcid" => Ok(Arc::new(HttpOrcidClient::new(config)?)),
        "mock" => Ok(Arc::new(MockOrcid::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown ORCID provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_exchange() {
        let client = MockOrcid::new();
        client.register("good", "0000-0002-1825-0097", Some("Josiah Carberry"));

        let identity = client.exchange_code("good", "https://app/callback").await.unwrap();
        assert_eq!(identity.orcid_id, "0000-0002-1825-0097");

        let err = client.exchange_code("bad", "https://app/callback").await.unwrap_err();
        assert!(matches!(err, AppError::Orcid { .. }));
    }

    #[test]
    fn test_http_client_requires_credentials() {
        let config = OrcidConfig {
            provider: "orcid".to_string(),
            client_id: None,
            client_secret: None,
            token_url: "https://orcid.org/oauth/token".to_string(),
        };
        assert!(matches!(
            HttpOrcidClient::new(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_factory_unknown_provider() {
        let config = OrcidConfig {
            provider: "linkedin".to_string(),
            client_id: None,
            client_secret: None,
            token_url: String::new(),
        };
        assert!(create_orcid_client(&config).is_err());
    }
}
