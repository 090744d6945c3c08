//! Session context and token handling
//!
//! Every write operation receives an explicit [`SessionContext`] instead of
//! reading ambient session state. The gateway builds it from a bearer token
//! carrying the principal id and linked wallet address.

use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// An externally verified author identity (ORCID)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub orcid_id: String,
    pub display_name: Option<String>,
}

/// Caller identity passed to every pipeline and ownership operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub principal_id: Uuid,
    pub wallet_address: String,
    pub verified_identity: Option<VerifiedIdentity>,
    /// A World ID proof is on record for the principal
    #[serde(default)]
    pub human_verified: bool,
    pub request_id: String,
}

impl SessionContext {
    /// Build a context, rejecting an empty wallet address
    pub fn new(principal_id: Uuid, wallet_address: impl Into<String>) -> Result<Self> {
        let wallet_address = wallet_address.into().trim().to_string();
        if wallet_address.is_empty() {
            return Err(AppError::Unauthorized {
                message: "A linked wallet address is required".to_string(),
            });
        }
        Ok(Self {
            principal_id,
            wallet_address,
            verified_identity: None,
            human_verified: false,
            request_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn with_identity(mut self, identity: Option<VerifiedIdentity>) -> Self {
        self.verified_identity = identity;
        self
    }

    pub fn with_human_verification(mut self, verified: bool) -> Self {
        self.human_verified = verified;
        self
    }

    /// Wallet address normalized for storage and comparison
    pub fn wallet_lower(&self) -> String {
        self.wallet_address.to_ascii_lowercase()
    }

    /// Require a verified ORCID identity
    pub fn require_verified_identity(&self) -> Result<&VerifiedIdentity> {
        self.verified_identity.as_ref().ok_or_else(|| AppError::Forbidden {
            message: "A verified ORCID identity is required to publish".to_string(),
        })
    }

    /// Require a recorded World ID proof
    pub fn require_human_verification(&self) -> Result<()> {
        if self.human_verified {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "A World ID verification is required to publish".to_string(),
            })
        }
    }
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (principal id)
    pub sub: String,

    /// Linked wallet address
    #[serde(default)]
    pub wallet: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Session token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Issue a token for a principal and wallet
    pub fn generate_token(&self, principal_id: Uuid, wallet: Option<&str>) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = SessionClaims {
            sub: principal_id.to_string(),
            wallet: wallet.map(str::to_string),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })
    }

    /// Turn a bearer token into a session context
    pub fn session_from_token(&self, token: &str) -> Result<SessionContext> {
        let claims = self.validate_token(token)?;
        let principal_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)?;
        let wallet = claims.wallet.unwrap_or_default();
        SessionContext::new(principal_id, wallet)
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum extractor for SessionContext
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
    Arc<JwtManager>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must be a bearer token".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let mut session = jwt.session_from_token(token)?;
        session.request_id = request_id;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "0xAbC0000000000000000000000000000000000001";

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_token_roundtrip_builds_session() {
        let manager = JwtManager::new("test_secret", 3600);
        let principal = Uuid::new_v4();

        let token = manager.generate_token(principal, Some(WALLET)).unwrap();
        let session = manager.session_from_token(&token).unwrap();

        assert_eq!(session.principal_id, principal);
        assert_eq!(session.wallet_address, WALLET);
        assert_eq!(session.wallet_lower(), WALLET.to_ascii_lowercase());
        assert!(session.verified_identity.is_none());
    }

    #[test]
    fn test_missing_wallet_is_unauthorized() {
        let manager = JwtManager::new("test_secret", 3600);
        let token = manager.generate_token(Uuid::new_v4(), None).unwrap();
        let err = manager.session_from_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let issuer = JwtManager::new("secret_a", 3600);
        let verifier = JwtManager::new("secret_b", 3600);
        let token = issuer.generate_token(Uuid::new_v4(), Some(WALLET)).unwrap();
        assert!(matches!(
            verifier.validate_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn test_publish_requires_identity() {
        let session = SessionContext::new(Uuid::new_v4(), WALLET).unwrap();
        assert!(session.require_verified_identity().is_err());

        let session = session.with_identity(Some(VerifiedIdentity {
            orcid_id: "0000-0002-1825-0097".into(),
            display_name: Some("Josiah Carberry".into()),
        }));
        assert_eq!(
            session.require_verified_identity().unwrap().orcid_id,
            "0000-0002-1825-0097"
        );
    }

    #[test]
    fn test_publish_requires_world_id() {
        let session = SessionContext::new(Uuid::new_v4(), WALLET).unwrap();
        assert!(!session.human_verified);
        assert!(matches!(
            session.require_human_verification(),
            Err(AppError::Forbidden { .. })
        ));
        assert!(session
            .with_human_verification(true)
            .require_human_verification()
            .is_ok());
    }
}
