//! Chain minting client abstraction
//!
//! Registers an IP asset for a published article on Story Protocol:
//! - Fixed network table (chain id, RPC, explorer and scanner URLs)
//! - Contract resolution that fails fast when a network is not configured
//! - `StoryChainClient` signing through ethers
//! - `MockChainClient` for tests and local development

mod story;

pub use story::StoryChainClient;

use crate::config::ChainConfig;
use crate::errors::{AppError, Result};
use crate::metadata::content_hash;
use crate::types::Network;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Static facts about a supported network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub network: Network,
    pub chain_id: u64,
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
    pub scan_url: &'static str,
}

static TESTNET: NetworkProfile = NetworkProfile {
    network: Network::Testnet,
    chain_id: 1315,
    name: "Story Testnet (Aeneid)",
    rpc_url: "https://aeneid.storyrpc.io",
    explorer_url: "https://aeneid.explorer.story.foundation",
    scan_url: "https://aeneid.storyscan.io",
};

static MAINNET: NetworkProfile = NetworkProfile {
    network: Network::Mainnet,
    chain_id: 1514,
    name: "Story Mainnet",
    rpc_url: "https://mainnet.storyrpc.io",
    explorer_url: "https://explorer.story.foundation",
    scan_url: "https://storyscan.io",
};

impl NetworkProfile {
    pub fn for_network(network: Network) -> &'static NetworkProfile {
        match network {
            Network::Testnet => &TESTNET,
            Network::Mainnet => &MAINNET,
        }
    }

    pub fn ip_asset_url(&self, ip_asset_id: &str) -> String {
        format!("{}/ipa/{}", self.explorer_url, ip_asset_id)
    }

    pub fn transaction_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.scan_url, tx_hash)
    }
}

/// A network with every address needed to submit a registration
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub profile: &'static NetworkProfile,
    pub rpc_url: String,
    pub spg_nft_contract: Address,
    pub registration_workflow: Address,
}

/// Resolve contract addresses for a network, refusing empty ones
pub fn resolve_network(config: &ChainConfig, network: Network) -> Result<ResolvedNetwork> {
    let profile = NetworkProfile::for_network(network);
    let contracts = config.contracts(network);

    let spg = required_address(network, "SPG NFT contract", contracts.spg_nft_contract.as_deref())?;
    let workflow = required_address(
        network,
        "registration workflow contract",
        contracts.registration_workflow.as_deref(),
    )?;

    let rpc_url = contracts
        .rpc_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(profile.rpc_url)
        .to_string();

    Ok(ResolvedNetwork {
        profile,
        rpc_url,
        spg_nft_contract: spg,
        registration_workflow: workflow,
    })
}

fn required_address(network: Network, what: &str, value: Option<&str>) -> Result<Address> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        AppError::NetworkNotConfigured {
            network: network.to_string(),
            message: format!("no {} address configured", what),
        }
    })?;

    value.parse::<Address>().map_err(|e| AppError::Configuration {
        message: format!("Invalid {} address '{}' for {}: {}", what, value, network, e),
    })
}

/// Inputs for a single IP-asset registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub network: Network,
    /// Address that receives the minted NFT
    pub recipient: String,
    pub ip_metadata_uri: String,
    pub ip_metadata_hash: String,
    pub nft_metadata_uri: String,
    pub nft_metadata_hash: String,
}

/// Confirmed result of a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintReceipt {
    pub transaction_hash: String,
    pub ip_asset_id: String,
    pub spg_contract_address: String,
    pub network: Network,
    pub minted_at: DateTime<Utc>,
}

/// Trait for IP-asset registration
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit the registration and wait for it to be confirmed
    async fn register_ip_asset(&self, request: &RegistrationRequest) -> Result<MintReceipt>;

    /// Client name for logs and metrics
    fn name(&self) -> &str;
}

/// Map a wallet/RPC failure message to an error
///
/// A wallet rejection is a user-facing cancel; anything else is surfaced
/// verbatim.
pub fn classify_chain_failure(message: impl Into<String>) -> AppError {
    let message = message.into();
    let lower = message.to_ascii_lowercase();
    let rejected = ["user rejected", "user denied", "rejected by user", "code=4001", "\"code\":4001", "code: 4001"]
        .iter()
        .any(|needle| lower.contains(needle));

    if rejected {
        AppError::SignatureRejected
    } else {
        AppError::Chain { message }
    }
}

/// Decode a `0x`-prefixed 32-byte hash
pub(crate) fn decode_bytes32(field: &str, value: &str) -> Result<[u8; 32]> {
    let raw = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(raw).map_err(|e| AppError::InvalidFormat {
        message: format!("{} is not hex: {}", field, e),
    })?;
    bytes.try_into().map_err(|_| AppError::InvalidFormat {
        message: format!("{} must be 32 bytes", field),
    })
}

/// Mock chain client for testing
///
/// Produces deterministic hashes derived from the request and records every
/// call. A queued failure message is consumed by the next call.
pub struct MockChainClient {
    config: ChainConfig,
    calls: Mutex<Vec<RegistrationRequest>>,
    next_failure: Mutex<Option<String>>,
}

impl MockChainClient {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            calls: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    /// Make the next registration fail with this message
    pub fn fail_next(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(message.into());
        }
    }

    pub fn calls(&self) -> Vec<RegistrationRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn register_ip_asset(&self, request: &RegistrationRequest) -> Result<MintReceipt> {
        let resolved = resolve_network(&self.config, request.network)?;
        decode_bytes32("ip_metadata_hash", &request.ip_metadata_hash)?;
        decode_bytes32("nft_metadata_hash", &request.nft_metadata_hash)?;

        if let Some(message) = self.next_failure.lock().ok().and_then(|mut f| f.take()) {
            return Err(classify_chain_failure(message));
        }

        let attempt = {
            let mut calls = self.calls.lock().map_err(|_| AppError::Internal {
                message: "mock chain state poisoned".to_string(),
            })?;
            calls.push(request.clone());
            calls.len()
        };

        let seed = format!(
            "{}|{}|{}|{}",
            request.ip_metadata_hash, request.nft_metadata_hash, request.recipient, attempt
        );
        let tx_hash = content_hash(seed.as_bytes());
        let ip_seed = content_hash(format!("ipa|{}", seed).as_bytes());

        Ok(MintReceipt {
            transaction_hash: tx_hash,
            ip_asset_id: format!("0x{}", &ip_seed[2..42]),
            spg_contract_address: format!("{:?}", resolved.spg_nft_contract),
            network: request.network,
            minted_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "mock-chain"
    }
}

/// Create a chain client based on configuration
pub fn create_chain_client(config: &ChainConfig) -> Result<Arc<dyn ChainClient>> {
    match config.provider.as_str() {
        "story" => Ok(Arc::new(StoryChainClient::new(config.clone())?)),
        "mock" => Ok(Arc::new(MockChainClient::new(config.clone()))),
        other => Err(AppError::Configuration {
            message: format!("Unknown chain provider '{}'", other),
        }),
    }
}
