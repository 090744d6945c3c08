//! Error types for ScholarMint services
//!
//! Provides a single error taxonomy shared by the publisher and gateway:
//! - Validation failures rejected before any external call
//! - Ownership failures that never reveal whether an article exists
//! - Pipeline ordering conflicts
//! - External service failures surfaced verbatim (pinning, chain, ORCID)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Generic message for failed link attempts
pub const NOT_OWNER_MESSAGE: &str = "Update failed - you may not own this article";

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidToken,
    ExpiredToken,

    // Authorization errors (3xxx)
    Forbidden,
    NotOwner,
    AlreadyClaimed,

    // Resource errors (4xxx)
    NotFound,
    ArticleNotFound,
    DraftNotFound,

    // Conflict errors (5xxx)
    Conflict,
    StepOutOfOrder,
    StepInFlight,
    AlreadyPersisted,
    AlreadyMinted,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    PinningError,
    ChainError,
    SignatureRejected,
    OrcidError,
    CacheError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    RenderError,
    NetworkNotConfigured,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::ExpiredToken => 2003,

            ErrorCode::Forbidden => 3001,
            ErrorCode::NotOwner => 3002,
            ErrorCode::AlreadyClaimed => 3003,

            ErrorCode::NotFound => 4001,
            ErrorCode::ArticleNotFound => 4002,
            ErrorCode::DraftNotFound => 4003,

            ErrorCode::Conflict => 5001,
            ErrorCode::StepOutOfOrder => 5002,
            ErrorCode::StepInFlight => 5003,
            ErrorCode::AlreadyPersisted => 5004,
            ErrorCode::AlreadyMinted => 5005,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::PinningError => 8002,
            ErrorCode::ChainError => 8003,
            ErrorCode::SignatureRejected => 8004,
            ErrorCode::OrcidError => 8005,
            ErrorCode::CacheError => 8006,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::RenderError => 9004,
            ErrorCode::NetworkNotConfigured => 9005,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("{}", NOT_OWNER_MESSAGE)]
    NotOwner,

    #[error("Failed to claim article - it may already be claimed")]
    AlreadyClaimed { id: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Article not found: {id}")]
    ArticleNotFound { id: String },

    #[error("Draft not found: {id}")]
    DraftNotFound { id: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    #[error("Step '{step}' requires '{requires}' to complete first")]
    StepOutOfOrder { step: String, requires: String },

    #[error("A pipeline step is already running for draft {draft_id}")]
    StepInFlight { draft_id: String },

    #[error("Draft {draft_id} was already published as article {article_id}")]
    AlreadyPersisted { draft_id: String, article_id: String },

    #[error("Draft {draft_id} is already minted as IP asset {ip_asset_id}; its pinned content is final")]
    AlreadyMinted { draft_id: String, ip_asset_id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Pinning service error: {message}")]
    Pinning { message: String },

    #[error("Chain error: {message}")]
    Chain { message: String },

    #[error("Signature request was rejected in the wallet")]
    SignatureRejected,

    #[error("ORCID error: {message}")]
    Orcid { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Network '{network}' is not configured: {message}")]
    NetworkNotConfigured { network: String, message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::NotOwner => ErrorCode::NotOwner,
            AppError::AlreadyClaimed { .. } => ErrorCode::AlreadyClaimed,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::ArticleNotFound { .. } => ErrorCode::ArticleNotFound,
            AppError::DraftNotFound { .. } => ErrorCode::DraftNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::StepOutOfOrder { .. } => ErrorCode::StepOutOfOrder,
            AppError::StepInFlight { .. } => ErrorCode::StepInFlight,
            AppError::AlreadyPersisted { .. } => ErrorCode::AlreadyPersisted,
            AppError::AlreadyMinted { .. } => ErrorCode::AlreadyMinted,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Pinning { .. } => ErrorCode::PinningError,
            AppError::Chain { .. } => ErrorCode::ChainError,
            AppError::SignatureRejected => ErrorCode::SignatureRejected,
            AppError::Orcid { .. } => ErrorCode::OrcidError,
            AppError::CacheError { .. } => ErrorCode::CacheError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Render { .. } => ErrorCode::RenderError,
            AppError::NetworkNotConfigured { .. } => ErrorCode::NetworkNotConfigured,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } | AppError::InvalidToken | AppError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            AppError::Forbidden { .. } | AppError::NotOwner => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::ArticleNotFound { .. }
            | AppError::DraftNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::AlreadyClaimed { .. }
            | AppError::Duplicate { .. }
            | AppError::StepOutOfOrder { .. }
            | AppError::StepInFlight { .. }
            | AppError::AlreadyPersisted { .. }
            | AppError::AlreadyMinted { .. }
            | AppError::SignatureRejected => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Render { .. }
            | AppError::CacheError { .. }
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Pinning { .. }
            | AppError::Chain { .. }
            | AppError::Orcid { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::NetworkNotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Shorthand for a field-level validation failure
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();
        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ArticleNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ArticleNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_not_owner_is_generic() {
        let err = AppError::NotOwner;
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), NOT_OWNER_MESSAGE);
        assert!(!err.to_string().contains("not found"));
    }

    #[test]
    fn test_claim_conflict_distinct_from_not_found() {
        let claimed = AppError::AlreadyClaimed { id: "a".into() };
        let missing = AppError::ArticleNotFound { id: "a".into() };
        assert_eq!(claimed.status_code(), StatusCode::CONFLICT);
        assert_ne!(claimed.code(), missing.code());
    }

    #[test]
    fn test_pipeline_conflicts() {
        let err = AppError::StepOutOfOrder {
            step: "mint".into(),
            requires: "upload_ipfs".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("upload_ipfs"));
        assert_eq!(err.code().as_code(), 5002);
    }

    #[test]
    fn test_already_minted_is_conflict() {
        let err = AppError::AlreadyMinted {
            draft_id: "d".into(),
            ip_asset_id: "0xabc".into(),
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code().as_code(), 5005);
        assert!(err.to_string().contains("0xabc"));
    }

    #[test]
    fn test_external_errors_are_bad_gateway() {
        let err = AppError::Chain {
            message: "execution reverted".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.is_server_error());
        assert!(err.to_string().contains("execution reverted"));
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("title", "Title is required");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unconfigured_network() {
        let err = AppError::NetworkNotConfigured {
            network: "mainnet".into(),
            message: "SPG contract address missing".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), ErrorCode::NetworkNotConfigured);
    }
}
