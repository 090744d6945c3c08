//! Story Protocol registration over JSON-RPC using ethers-rs.

use super::{
    classify_chain_failure, decode_bytes32, resolve_network, ChainClient, MintReceipt,
    RegistrationRequest,
};
use crate::config::ChainConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::abi::{self, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Log, TransactionRequest, H256, U64};
use ethers::utils::{id, keccak256, to_checksum};
use std::convert::TryFrom;
use std::time::Duration;
use tracing::{info, instrument, warn};

const MINT_AND_REGISTER_IP: &str =
    "mintAndRegisterIp(address,address,(string,bytes32,string,bytes32),bool)";

const IP_REGISTERED_EVENT: &str =
    "IPRegistered(address,uint256,address,uint256,string,string,uint256)";

/// Signs registrations with a single wallet reused across attempts
pub struct StoryChainClient {
    config: ChainConfig,
    wallet: LocalWallet,
}

impl StoryChainClient {
    pub fn new(config: ChainConfig) -> Result<Self> {
        let key = config
            .signer_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "chain.signer_key is required for the story provider".to_string(),
            })?;

        let wallet = key.parse::<LocalWallet>().map_err(|e| AppError::Configuration {
            message: format!("Invalid signer key: {}", e),
        })?;

        Ok(Self { config, wallet })
    }

    /// Address of the signing wallet
    pub fn signer_address(&self) -> String {
        to_checksum(&self.wallet.address(), None)
    }
}

/// ABI-encode the registration workflow call
pub(crate) fn encode_mint_call(
    spg_nft_contract: Address,
    recipient: Address,
    request: &RegistrationRequest,
) -> Result<Bytes> {
    let ip_hash = decode_bytes32("ip_metadata_hash", &request.ip_metadata_hash)?;
    let nft_hash = decode_bytes32("nft_metadata_hash", &request.nft_metadata_hash)?;

    let metadata = Token::Tuple(vec![
        Token::String(request.ip_metadata_uri.clone()),
        Token::FixedBytes(ip_hash.to_vec()),
        Token::String(request.nft_metadata_uri.clone()),
        Token::FixedBytes(nft_hash.to_vec()),
    ]);

    let mut data = id(MINT_AND_REGISTER_IP).to_vec();
    data.extend(abi::encode(&[
        Token::Address(spg_nft_contract),
        Token::Address(recipient),
        metadata,
        // allow duplicates: the same metadata may be re-registered on retry
        Token::Bool(true),
    ]));

    Ok(Bytes::from(data))
}

/// Find the registered IP id in the receipt logs
pub(crate) fn extract_ip_id(logs: &[Log]) -> Option<Address> {
    let topic = H256::from(keccak256(IP_REGISTERED_EVENT.as_bytes()));
    logs.iter()
        .find(|log| log.topics.first() == Some(&topic) && log.data.len() >= 32)
        .map(|log| Address::from_slice(&log.data[12..32]))
}

#[async_trait]
impl ChainClient for StoryChainClient {
    #[instrument(skip(self, request), fields(network = %request.network))]
    async fn register_ip_asset(&self, request: &RegistrationRequest) -> Result<MintReceipt> {
        let resolved = resolve_network(&self.config, request.network)?;

        let recipient = request.recipient.parse::<Address>().map_err(|e| AppError::InvalidFormat {
            message: format!("Invalid recipient address: {}", e),
        })?;
        let data = encode_mint_call(resolved.spg_nft_contract, recipient, request)?;

        let provider = Provider::<Http>::try_from(resolved.rpc_url.as_str()).map_err(|e| {
            AppError::Configuration {
                message: format!("Invalid RPC URL {}: {}", resolved.rpc_url, e),
            }
        })?;
        let wallet = self.wallet.clone().with_chain_id(resolved.profile.chain_id);
        let client = SignerMiddleware::new(provider, wallet);

        let tx = TransactionRequest::new()
            .to(resolved.registration_workflow)
            .value(0)
            .data(data);

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_chain_failure(e.to_string()))?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        info!(tx_hash = %tx_hash, chain_id = resolved.profile.chain_id, "Registration submitted");

        let wait = pending.confirmations(self.config.confirmations.max(1));
        let receipt = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), wait)
            .await
            .map_err(|_| AppError::Chain {
                message: format!(
                    "Timed out after {}s waiting for {}",
                    self.config.timeout_secs, tx_hash
                ),
            })?
            .map_err(|e| classify_chain_failure(e.to_string()))?
            .ok_or_else(|| AppError::Chain {
                message: format!("Transaction {} was dropped", tx_hash),
            })?;

        if receipt.status != Some(U64::from(1)) {
            warn!(tx_hash = %tx_hash, "Registration reverted");
            return Err(AppError::Chain {
                message: format!("Transaction {} reverted", tx_hash),
            });
        }

        let ip_id = extract_ip_id(&receipt.logs).ok_or_else(|| AppError::Chain {
            message: format!("No IPRegistered event in transaction {}", tx_hash),
        })?;

        Ok(MintReceipt {
            transaction_hash: tx_hash,
            ip_asset_id: to_checksum(&ip_id, None),
            spg_contract_address: to_checksum(&resolved.spg_nft_contract, None),
            network: request.network,
            minted_at: Utc::now(),
        })
    }

    fn name(&self) -> &str {
        "story"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::content_hash;
    use crate::types::Network;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn config_with_key() -> ChainConfig {
        ChainConfig {
            signer_key: Some(KEY.into()),
            ..ChainConfig::default()
        }
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            network: Network::Testnet,
            recipient: "0x00000000000000000000000000000000000000aa".into(),
            ip_metadata_uri: "ipfs://QmIp".into(),
            ip_metadata_hash: content_hash(b"ip"),
            nft_metadata_uri: "ipfs://QmNft".into(),
            nft_metadata_hash: content_hash(b"nft"),
        }
    }

    #[test]
    fn test_requires_signer_key() {
        assert!(matches!(
            StoryChainClient::new(ChainConfig::default()),
            Err(AppError::Configuration { .. })
        ));
        let client = StoryChainClient::new(config_with_key()).unwrap();
        assert!(client.signer_address().starts_with("0x"));
    }

    #[test]
    fn test_encode_mint_call_layout() {
        let resolved = resolve_network(&ChainConfig::default(), Network::Testnet).unwrap();
        let recipient: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let data = encode_mint_call(resolved.spg_nft_contract, recipient, &request()).unwrap();

        assert_eq!(&data[..4], &id(MINT_AND_REGISTER_IP)[..]);
        // first argument is the SPG contract, left padded to 32 bytes
        assert_eq!(&data[4 + 12..4 + 32], resolved.spg_nft_contract.as_bytes());
        assert_eq!(&data[4 + 32 + 12..4 + 64], recipient.as_bytes());
    }

    #[test]
    fn test_encode_rejects_bad_hash() {
        let mut req = request();
        req.ip_metadata_hash = "0x1234".into();
        let recipient = Address::zero();
        assert!(encode_mint_call(Address::zero(), recipient, &req).is_err());
    }

    #[test]
    fn test_extract_ip_id_from_logs() {
        let ip_id: Address = "0x1111111111111111111111111111111111111111".parse().unwrap();
        let mut data = vec![0u8; 12];
        data.extend_from_slice(ip_id.as_bytes());
        data.extend_from_slice(&[0u8; 64]);

        let unrelated = Log {
            topics: vec![H256::repeat_byte(7)],
            data: Bytes::from(vec![0u8; 32]),
            ..Default::default()
        };
        let registered = Log {
            topics: vec![H256::from(keccak256(IP_REGISTERED_EVENT.as_bytes()))],
            data: Bytes::from(data),
            ..Default::default()
        };

        assert_eq!(extract_ip_id(&[unrelated.clone(), registered]), Some(ip_id));
        assert_eq!(extract_ip_id(&[unrelated]), None);
    }

    #[tokio::test]
    async fn test_unconfigured_network_fails_before_rpc() {
        let client = StoryChainClient::new(config_with_key()).unwrap();
        let mut req = request();
        req.network = Network::Mainnet;
        let err = client.register_ip_asset(&req).await.unwrap_err();
        assert!(matches!(err, AppError::NetworkNotConfigured { .. }));
    }
}
