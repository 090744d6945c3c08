//! Configuration management for ScholarMint services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use crate::types::Network;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SPG NFT collection used on the Aeneid testnet
pub const DEFAULT_TESTNET_SPG_CONTRACT: &str = "0xc32A8a0FF3beDDDa58393d022aF433e78739FAbc";

/// Registration workflows periphery contract on Aeneid
pub const DEFAULT_TESTNET_WORKFLOW_CONTRACT: &str = "0xbe39E1C756e921BD25DF86e7AAa31106d1eb0424";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration (pipeline checkpoints)
    pub redis: RedisConfig,

    /// Session token configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// IPFS pinning service
    #[serde(default)]
    pub pinning: PinningConfig,

    /// Chain minting
    #[serde(default)]
    pub chain: ChainConfig,

    /// Journal and pipeline settings
    #[serde(default)]
    pub publishing: PublishingConfig,

    /// ORCID OAuth
    #[serde(default)]
    pub orcid: OrcidConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply SQL migrations at start-up
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL; checkpoints stay in memory when unset
    pub url: Option<String>,

    /// Checkpoint TTL in seconds
    #[serde(default = "default_checkpoint_ttl")]
    pub checkpoint_ttl_secs: u64,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify session tokens
    pub jwt_secret: Option<String>,

    /// Session token lifetime in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_enabled")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PinningConfig {
    /// Pinning provider: pinata, mock
    #[serde(default = "default_pinning_provider")]
    pub provider: String,

    /// Pinata JWT
    pub jwt: Option<String>,

    /// Pinning API base URL
    #[serde(default = "default_pinning_api_base")]
    pub api_base: String,

    /// Public gateway used to build content URLs
    #[serde(default = "default_gateway_base")]
    pub gateway_base: String,

    /// Upload timeout in seconds
    #[serde(default = "default_pinning_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Chain provider: story, mock
    #[serde(default = "default_chain_provider")]
    pub provider: String,

    /// Hex private key of the session signer
    pub signer_key: Option<String>,

    /// Confirmations to wait for before a mint is reported
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,

    /// Transaction timeout in seconds
    #[serde(default = "default_chain_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_testnet_contracts")]
    pub testnet: NetworkContracts,

    #[serde(default)]
    pub mainnet: NetworkContracts,
}

/// Per-network contract addresses
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetworkContracts {
    /// RPC override; the built-in endpoint is used when unset
    pub rpc_url: Option<String>,

    /// SPG NFT collection the asset is minted into
    pub spg_nft_contract: Option<String>,

    /// Registration workflow contract called to mint and register
    pub registration_workflow: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishingConfig {
    /// Journal name printed on the masthead and NFT name
    #[serde(default = "default_journal_name")]
    pub journal_name: String,

    /// DOI prefix
    #[serde(default = "default_doi_prefix")]
    pub doi_prefix: String,

    /// License applied when the author leaves it empty
    #[serde(default = "default_license")]
    pub default_license: String,

    /// Auto-save interval in seconds
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,

    /// Idle time after which a live session is dropped from memory
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,

    /// Maximum uploaded cover size in bytes
    #[serde(default = "default_max_cover_bytes")]
    pub max_cover_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrcidConfig {
    /// ORCID provider: orcid, mock
    #[serde(default = "default_orcid_provider")]
    pub provider: String,

    pub client_id: Option<String>,

    pub client_secret: Option<String>,

    #[serde(default = "default_orcid_token_url")]
    pub token_url: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_max_body_bytes() -> usize { 16 * 1024 * 1024 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_checkpoint_ttl() -> u64 { 7 * 24 * 3600 }
fn default_key_prefix() -> String { "scholarmint".to_string() }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }
fn default_pinning_provider() -> String { "pinata".to_string() }
fn default_pinning_api_base() -> String { "https://api.pinata.cloud".to_string() }
fn default_gateway_base() -> String { "https://gateway.pinata.cloud/ipfs".to_string() }
fn default_pinning_timeout() -> u64 { 60 }
fn default_chain_provider() -> String { "story".to_string() }
fn default_confirmations() -> usize { 1 }
fn default_chain_timeout() -> u64 { 120 }
fn default_journal_name() -> String { "Krump Journal".to_string() }
fn default_doi_prefix() -> String { "10.KRUMPJOURNAL".to_string() }
fn default_license() -> String { "CC BY 4.0".to_string() }
fn default_autosave_interval() -> u64 { 30 }
fn default_session_idle() -> u64 { 3600 }
fn default_max_cover_bytes() -> usize { 5 * 1024 * 1024 }
fn default_orcid_provider() -> String { "orcid".to_string() }
fn default_orcid_token_url() -> String { "https://orcid.org/oauth/token".to_string() }

fn default_testnet_contracts() -> NetworkContracts {
    NetworkContracts {
        rpc_url: None,
        spg_nft_contract: Some(DEFAULT_TESTNET_SPG_CONTRACT.to_string()),
        registration_workflow: Some(DEFAULT_TESTNET_WORKFLOW_CONTRACT.to_string()),
    }
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            provider: default_pinning_provider(),
            jwt: None,
            api_base: default_pinning_api_base(),
            gateway_base: default_gateway_base(),
            timeout_secs: default_pinning_timeout(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            provider: default_chain_provider(),
            signer_key: None,
            confirmations: default_confirmations(),
            timeout_secs: default_chain_timeout(),
            testnet: default_testnet_contracts(),
            mainnet: NetworkContracts::default(),
        }
    }
}

impl ChainConfig {
    /// Contract addresses for a network
    pub fn contracts(&self, network: Network) -> &NetworkContracts {
        match network {
            Network::Testnet => &self.testnet,
            Network::Mainnet => &self.mainnet,
        }
    }
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            journal_name: default_journal_name(),
            doi_prefix: default_doi_prefix(),
            default_license: default_license(),
            autosave_interval_secs: default_autosave_interval(),
            session_idle_secs: default_session_idle(),
            max_cover_bytes: default_max_cover_bytes(),
        }
    }
}

impl PublishingConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

impl Default for OrcidConfig {
    fn default() -> Self {
        Self {
            provider: default_orcid_provider(),
            client_id: None,
            client_secret: None,
            token_url: default_orcid_token_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__CHAIN__SIGNER_KEY=0x...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                max_body_bytes: default_max_body_bytes(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/scholarmint".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: default_enabled(),
            },
            redis: RedisConfig {
                url: None,
                checkpoint_ttl_secs: default_checkpoint_ttl(),
                key_prefix: default_key_prefix(),
            },
            auth: AuthConfig {
                jwt_secret: None,
                jwt_expiration_secs: default_jwt_expiration(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_enabled(),
                metrics_port: default_metrics_port(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
            pinning: PinningConfig::default(),
            chain: ChainConfig::default(),
            publishing: PublishingConfig::default(),
            orcid: OrcidConfig::default(),
        }
    }
}
