//! ScholarMint Common Library
//!
//! Shared code for the publisher and gateway crates including:
//! - Database models, storage traits and repository
//! - Pinning and chain client abstractions
//! - Canonical metadata documents
//! - Ownership guard and identifier parsing
//! - Error types, configuration, session handling and metrics

pub mod auth;
pub mod cache;
pub mod chain;
pub mod config;
pub mod db;
pub mod errors;
pub mod identifiers;
pub mod identity;
pub mod metadata;
pub mod metrics;
pub mod ownership;
pub mod pinning;
pub mod types;

// Re-export commonly used types
pub use auth::SessionContext;
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use types::{ArticleStatus, Network, PublicationType};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
