//! Parsing of user-supplied external identifiers
//!
//! Each linkable identifier accepts either its canonical form or a known
//! registry/explorer URL, and is normalized before it reaches the datastore.
//! Anything unrecognized is rejected with [`AppError::InvalidFormat`].

use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Zenodo's DOI registrant prefix
pub const ZENODO_DOI_PREFIX: &str = "10.5281/zenodo.";

static ZENODO_DOI: OnceLock<Regex> = OnceLock::new();
static ZENODO_RECORD_URL: OnceLock<Regex> = OnceLock::new();
static DOI_RESOLVER_URL: OnceLock<Regex> = OnceLock::new();
static NUMERIC: OnceLock<Regex> = OnceLock::new();
static IP_ASSET_ID: OnceLock<Regex> = OnceLock::new();
static IP_ASSET_URL: OnceLock<Regex> = OnceLock::new();
static TX_HASH: OnceLock<Regex> = OnceLock::new();
static TX_URL: OnceLock<Regex> = OnceLock::new();
static ORCID_ID: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("identifier pattern must compile"))
}

/// Which article field a link operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    ZenodoDoi,
    IpAssetId,
    TransactionHash,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::ZenodoDoi => "zenodo_doi",
            LinkKind::IpAssetId => "ip_asset_id",
            LinkKind::TransactionHash => "transaction_hash",
        }
    }

    /// Normalize raw input into a linkable identifier of this kind
    pub fn parse(&self, input: &str) -> Result<LinkedIdentifier> {
        match self {
            LinkKind::ZenodoDoi => parse_zenodo_doi(input).map(LinkedIdentifier::ZenodoDoi),
            LinkKind::IpAssetId => parse_ip_asset_id(input).map(LinkedIdentifier::IpAssetId),
            LinkKind::TransactionHash => {
                parse_transaction_hash(input).map(LinkedIdentifier::TransactionHash)
            }
        }
    }
}

/// A normalized identifier ready to be written to an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LinkedIdentifier {
    ZenodoDoi(String),
    IpAssetId(String),
    TransactionHash(String),
}

impl LinkedIdentifier {
    pub fn kind(&self) -> LinkKind {
        match self {
            LinkedIdentifier::ZenodoDoi(_) => LinkKind::ZenodoDoi,
            LinkedIdentifier::IpAssetId(_) => LinkKind::IpAssetId,
            LinkedIdentifier::TransactionHash(_) => LinkKind::TransactionHash,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            LinkedIdentifier::ZenodoDoi(v)
            | LinkedIdentifier::IpAssetId(v)
            | LinkedIdentifier::TransactionHash(v) => v,
        }
    }
}

/// Normalize a Zenodo DOI, record URL, or bare record number
pub fn parse_zenodo_doi(input: &str) -> Result<String> {
    let input = input.trim();

    if pattern(&ZENODO_DOI, r"^10\.\d+/zenodo\.\d+$").is_match(input) {
        return Ok(input.to_string());
    }

    if let Some(caps) = pattern(&DOI_RESOLVER_URL, r"doi\.org/(10\.\d+/zenodo\.\d+)(?:[/?#]|$)")
        .captures(input)
    {
        return Ok(caps[1].to_string());
    }

    if let Some(caps) = pattern(&ZENODO_RECORD_URL, r"zenodo\.org/records?/(\d+)").captures(input) {
        return Ok(format!("{}{}", ZENODO_DOI_PREFIX, &caps[1]));
    }

    if pattern(&NUMERIC, r"^\d+$").is_match(input) {
        return Ok(format!("{}{}", ZENODO_DOI_PREFIX, input));
    }

    Err(AppError::InvalidFormat {
        message: "Invalid DOI format. Use a Zenodo DOI (10.5281/zenodo.XXXXX), record URL, or record number"
            .to_string(),
    })
}

/// Normalize an IP-asset id or an explorer `/ipa/` URL
pub fn parse_ip_asset_id(input: &str) -> Result<String> {
    let input = input.trim();

    if pattern(&IP_ASSET_ID, r"^0x[0-9a-fA-F]{40}$").is_match(input) {
        return Ok(input.to_string());
    }

    if let Some(caps) = pattern(
        &IP_ASSET_URL,
        r"(?:aeneid\.)?explorer\.story\.foundation/ipa/(0x[0-9a-fA-F]{40})(?:[/?#]|$)",
    )
    .captures(input)
    {
        return Ok(caps[1].to_string());
    }

    Err(AppError::InvalidFormat {
        message: "Invalid IP Asset ID. Use a 0x address (40 hex characters) or an explorer URL"
            .to_string(),
    })
}

/// Normalize a transaction hash or a block scanner `/tx/` URL
pub fn parse_transaction_hash(input: &str) -> Result<String> {
    let input = input.trim();

    if pattern(&TX_HASH, r"^0x[0-9a-fA-F]{64}$").is_match(input) {
        return Ok(input.to_string());
    }

    if let Some(caps) = pattern(
        &TX_URL,
        r"(?:(?:aeneid\.)?storyscan\.io|testnet\.storyscan\.xyz|explorer\.story\.foundation)/tx/(0x[0-9a-fA-F]{64})(?:[/?#]|$)",
    )
    .captures(input)
    {
        return Ok(caps[1].to_string());
    }

    Err(AppError::InvalidFormat {
        message: "Invalid transaction hash. Use a 0x hash (64 hex characters) or a block explorer URL"
            .to_string(),
    })
}

/// Validate an ORCID iD (`0000-0002-1825-0097`)
pub fn parse_orcid_id(input: &str) -> Result<String> {
    let input = input.trim();
    if pattern(&ORCID_ID, r"^\d{4}-\d{4}-\d{4}-\d{3}[0-9X]$").is_match(input) {
        Ok(input.to_string())
    } else {
        Err(AppError::InvalidFormat {
            message: "Invalid ORCID format (e.g. 0000-0002-1825-0097)".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xABCDEF0123456789000000000000000000000001";
    const TX: &str = "0x9f2c1a7e4b5d6c8f0a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f6071";

    #[test]
    fn test_doi_canonical_form_accepted() {
        assert_eq!(
            parse_zenodo_doi("10.5281/zenodo.17755770").unwrap(),
            "10.5281/zenodo.17755770"
        );
    }

    #[test]
    fn test_doi_from_record_url() {
        assert_eq!(
            parse_zenodo_doi("https://zenodo.org/records/17755770").unwrap(),
            "10.5281/zenodo.17755770"
        );
        assert_eq!(
            parse_zenodo_doi("https://zenodo.org/record/17755770?preview=1").unwrap(),
            "10.5281/zenodo.17755770"
        );
    }

    #[test]
    fn test_doi_from_number_and_resolver() {
        assert_eq!(parse_zenodo_doi(" 17755770 ").unwrap(), "10.5281/zenodo.17755770");
        assert_eq!(
            parse_zenodo_doi("https://doi.org/10.5281/zenodo.42").unwrap(),
            "10.5281/zenodo.42"
        );
    }

    #[test]
    fn test_doi_rejects_garbage() {
        assert!(matches!(
            parse_zenodo_doi("not-a-doi"),
            Err(AppError::InvalidFormat { .. })
        ));
        assert!(parse_zenodo_doi("10.1000/xyz123").is_err());
        assert!(parse_zenodo_doi("").is_err());
    }

    #[test]
    fn test_ip_asset_id_verbatim_and_url() {
        assert_eq!(parse_ip_asset_id(ADDR).unwrap(), ADDR);

        let url = format!("https://aeneid.explorer.story.foundation/ipa/{}", ADDR);
        assert_eq!(parse_ip_asset_id(&url).unwrap(), ADDR);

        let mainnet = format!("https://explorer.story.foundation/ipa/{}?tab=overview", ADDR);
        assert_eq!(parse_ip_asset_id(&mainnet).unwrap(), ADDR);
    }

    #[test]
    fn test_ip_asset_id_length_checked() {
        let short = &ADDR[..41];
        assert!(parse_ip_asset_id(short).is_err());

        let long = format!("{}0", ADDR);
        assert!(parse_ip_asset_id(&long).is_err());

        let url = format!("https://aeneid.explorer.story.foundation/ipa/{}0", ADDR);
        assert!(parse_ip_asset_id(&url).is_err());
    }

    #[test]
    fn test_transaction_hash_forms() {
        assert_eq!(parse_transaction_hash(TX).unwrap(), TX);
        for base in [
            "https://aeneid.storyscan.io/tx/",
            "https://storyscan.io/tx/",
            "https://testnet.storyscan.xyz/tx/",
            "https://explorer.story.foundation/tx/",
        ] {
            let url = format!("{}{}", base, TX);
            assert_eq!(parse_transaction_hash(&url).unwrap(), TX, "{}", base);
        }
        assert!(parse_transaction_hash(ADDR).is_err());
    }

    #[test]
    fn test_link_kind_dispatch() {
        let id = LinkKind::ZenodoDoi.parse("17755770").unwrap();
        assert_eq!(id, LinkedIdentifier::ZenodoDoi("10.5281/zenodo.17755770".into()));
        assert_eq!(id.kind().as_str(), "zenodo_doi");
        assert!(LinkKind::IpAssetId.parse("17755770").is_err());
    }

    #[test]
    fn test_orcid_id() {
        assert!(parse_orcid_id("0000-0002-1825-0097").is_ok());
        assert!(parse_orcid_id("0000-0002-1694-233X").is_ok());
        assert!(parse_orcid_id("0000-0002-1825").is_err());
        assert!(parse_orcid_id("0000-0002-1825-009x").is_err());
    }
}
