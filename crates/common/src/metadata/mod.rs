//! Publication metadata builder
//!
//! Produces the three documents pinned for every article: the IP-asset
//! metadata, the NFT metadata, and the full article payload. Each document is
//! serialized once to canonical JSON and hashed over those exact bytes; the
//! same bytes are what gets uploaded, so the on-chain hash always matches the
//! stored document.

mod canonical;

pub use canonical::{content_hash, to_canonical_vec};

use crate::chain::NetworkProfile;
use crate::config::PublishingConfig;
use crate::errors::Result;
use crate::pinning::gateway_url;
use crate::types::{Network, PublicationType};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Serialized document plus the hash bound on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub bytes: Vec<u8>,
    pub hash: String,
}

impl MetadataDocument {
    pub fn from_value(value: &Value) -> Result<Self> {
        let bytes = to_canonical_vec(value)?;
        let hash = content_hash(&bytes);
        Ok(Self { bytes, hash })
    }

    pub fn as_value(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// Everything the builder needs; the caller supplies the clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadataInput {
    pub title: String,
    pub abstract_text: String,
    pub content_html: String,
    pub keywords: Vec<String>,
    pub license: String,
    pub publication_type: PublicationType,
    pub author_name: String,
    pub orcid_id: Option<String>,
    pub cover_cid: Option<String>,
    pub pdf_cid: Option<String>,
    pub network: Network,
    pub doi: String,
    pub issued_at: DateTime<Utc>,
}

/// The three documents for one article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataBundle {
    pub ip_asset: MetadataDocument,
    pub nft: MetadataDocument,
    pub article: MetadataDocument,
}

#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    journal_name: String,
    doi_prefix: String,
    gateway_base: String,
}

impl MetadataBuilder {
    pub fn new(
        journal_name: impl Into<String>,
        doi_prefix: impl Into<String>,
        gateway_base: impl Into<String>,
    ) -> Self {
        Self {
            journal_name: journal_name.into(),
            doi_prefix: doi_prefix.into(),
            gateway_base: gateway_base.into(),
        }
    }

    pub fn from_config(publishing: &PublishingConfig, gateway_base: &str) -> Self {
        Self::new(&publishing.journal_name, &publishing.doi_prefix, gateway_base)
    }

    /// Derive the article DOI: `<prefix>/article.<year>.<16 hex>`
    ///
    /// The suffix is a digest of the draft id and the authored content, so it
    /// is stable across retries and distinct for distinct drafts.
    pub fn derive_doi(
        &self,
        draft_id: Uuid,
        title: &str,
        abstract_text: &str,
        content_html: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let basis = to_canonical_vec(&json!({
            "abstract": abstract_text,
            "content": content_html,
            "draft": draft_id.to_string(),
            "title": title,
        }))?;
        let digest = hex::encode(Sha256::digest(&basis));
        Ok(format!(
            "{}/article.{}.{}",
            self.doi_prefix,
            issued_at.year(),
            &digest[..16]
        ))
    }

    pub fn build(&self, input: &ArticleMetadataInput) -> Result<MetadataBundle> {
        Ok(MetadataBundle {
            ip_asset: MetadataDocument::from_value(&self.ip_asset_value(input))?,
            nft: MetadataDocument::from_value(&self.nft_value(input))?,
            article: MetadataDocument::from_value(&self.article_value(input))?,
        })
    }

    fn ip_asset_value(&self, input: &ArticleMetadataInput) -> Value {
        let profile = NetworkProfile::for_network(input.network);
        let creator = match &input.orcid_id {
            Some(orcid) => format!("{} (ORCID: {})", input.author_name, orcid),
            None => input.author_name.clone(),
        };

        let mut doc = json!({
            "name": input.title,
            "description": input.abstract_text,
            "image": ipfs_uri_or_empty(input.cover_cid.as_deref()),
            "external_url": profile.explorer_url,
            "attributes": [
                attribute("DOI", &input.doi),
                attribute("Type", input.publication_type.label()),
                attribute("Creator", &creator),
                attribute("Network", input.network.label()),
                attribute("Generated", &timestamp(input.issued_at)),
                attribute("License", &input.license),
                attribute("Keywords", &input.keywords.join(", ")),
                attribute("PDF", &pdf_reference(input.pdf_cid.as_deref())),
            ],
        });

        if let Some(pdf) = input.pdf_cid.as_deref() {
            doc["content_url"] = Value::String(gateway_url(&self.gateway_base, pdf));
        }
        doc
    }

    fn nft_value(&self, input: &ArticleMetadataInput) -> Value {
        let profile = NetworkProfile::for_network(input.network);
        json!({
            "name": format!("{}: {}", self.journal_name, input.title),
            "description": input.abstract_text,
            "image": ipfs_uri_or_empty(input.cover_cid.as_deref()),
            "external_url": profile.scan_url,
            "attributes": [
                attribute("DOI", &input.doi),
                attribute("Publication Type", input.publication_type.label()),
                attribute("Author", &input.author_name),
                attribute("ORCID", input.orcid_id.as_deref().unwrap_or("N/A")),
                attribute("License", &input.license),
                attribute("Keywords", &input.keywords.join(", ")),
                attribute("Published", &timestamp(input.issued_at)),
            ],
        })
    }

    fn article_value(&self, input: &ArticleMetadataInput) -> Value {
        json!({
            "title": input.title,
            "abstract": input.abstract_text,
            "content": input.content_html,
            "keywords": input.keywords,
            "publicationType": input.publication_type.as_str(),
            "license": input.license,
            "authorName": input.author_name,
            "orcidId": input.orcid_id,
            "doi": input.doi,
            "doiUrl": format!("https://doi.org/{}", input.doi),
            "coverImage": input.cover_cid.as_deref().map(ipfs_uri),
            "pdf": input.pdf_cid.as_deref().map(ipfs_uri),
            "journal": self.journal_name,
            "createdAt": timestamp(input.issued_at),
        })
    }
}

fn attribute(trait_type: &str, value: &str) -> Value {
    json!({ "trait_type": trait_type, "value": value })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ipfs_uri(cid: &str) -> String {
    format!("ipfs://{}", cid)
}

fn ipfs_uri_or_empty(cid: Option<&str>) -> String {
    cid.map(ipfs_uri).unwrap_or_default()
}

fn pdf_reference(cid: Option<&str>) -> String {
    cid.map(ipfs_uri).unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder() -> MetadataBuilder {
        MetadataBuilder::new("Krump Journal", "10.KRUMPJOURNAL", "https://gateway.pinata.cloud/ipfs")
    }

    fn input() -> ArticleMetadataInput {
        ArticleMetadataInput {
            title: "Rhythm and Resistance".into(),
            abstract_text: "A study of battle circles.".into(),
            content_html: "<p>Body</p>".into(),
            keywords: vec!["krump".into(), "dance".into()],
            license: "CC BY 4.0".into(),
            publication_type: PublicationType::ResearchArticle,
            author_name: "Ada Tight".into(),
            orcid_id: Some("0000-0002-1825-0097".into()),
            cover_cid: Some("QmCover".into()),
            pdf_cid: Some("QmPdf".into()),
            network: Network::Testnet,
            doi: "10.KRUMPJOURNAL/article.2026.0123456789abcdef".into(),
            issued_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn attr<'a>(doc: &'a Value, name: &str) -> &'a str {
        doc["attributes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["trait_type"] == name)
            .and_then(|a| a["value"].as_str())
            .unwrap()
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = builder().build(&input()).unwrap();
        let b = builder().build(&input()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ip_asset.hash, content_hash(&a.ip_asset.bytes));
        assert_ne!(a.ip_asset.hash, a.nft.hash);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let mut changed = input();
        changed.title.push('!');
        let a = builder().build(&input()).unwrap();
        let b = builder().build(&changed).unwrap();
        assert_ne!(a.ip_asset.hash, b.ip_asset.hash);
    }

    #[test]
    fn test_ip_asset_document() {
        let bundle = builder().build(&input()).unwrap();
        let doc = bundle.ip_asset.as_value().unwrap();

        assert_eq!(doc["image"], "ipfs://QmCover");
        assert_eq!(doc["external_url"], "https://aeneid.explorer.story.foundation");
        assert_eq!(doc["content_url"], "https://gateway.pinata.cloud/ipfs/QmPdf");
        assert_eq!(attr(&doc, "Creator"), "Ada Tight (ORCID: 0000-0002-1825-0097)");
        assert_eq!(attr(&doc, "Network"), "Story Aeneid Testnet");
        assert_eq!(attr(&doc, "Keywords"), "krump, dance");
        assert_eq!(attr(&doc, "PDF"), "ipfs://QmPdf");
        assert_eq!(attr(&doc, "Generated"), "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_nft_document() {
        let mut no_pdf = input();
        no_pdf.pdf_cid = None;
        no_pdf.orcid_id = None;
        no_pdf.network = Network::Mainnet;

        let bundle = builder().build(&no_pdf).unwrap();
        let nft = bundle.nft.as_value().unwrap();
        assert_eq!(nft["name"], "Krump Journal: Rhythm and Resistance");
        assert_eq!(nft["external_url"], "https://storyscan.io");
        assert_eq!(attr(&nft, "ORCID"), "N/A");

        let ip = bundle.ip_asset.as_value().unwrap();
        assert!(ip.get("content_url").is_none());
        assert_eq!(attr(&ip, "PDF"), "N/A");
    }

    #[test]
    fn test_article_payload() {
        let bundle = builder().build(&input()).unwrap();
        let article = bundle.article.as_value().unwrap();
        assert_eq!(
            article["doiUrl"],
            "https://doi.org/10.KRUMPJOURNAL/article.2026.0123456789abcdef"
        );
        assert_eq!(article["publicationType"], "research_article");
        assert_eq!(article["coverImage"], "ipfs://QmCover");
    }

    #[test]
    fn test_derive_doi() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let draft = Uuid::new_v4();
        let a = builder().derive_doi(draft, "T", "A", "C", at).unwrap();
        let b = builder().derive_doi(draft, "T", "A", "C", at).unwrap();
        let other = builder().derive_doi(Uuid::new_v4(), "T", "A", "C", at).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(a.starts_with("10.KRUMPJOURNAL/article.2026."));
        assert_eq!(a.rsplit('.').next().unwrap().len(), 16);
    }
}
