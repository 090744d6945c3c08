//! Publication pipeline state machine
//!
//! Each variant carries every artifact produced so far, so a state can never
//! claim a stage whose inputs are missing. Steps may be re-run to replace
//! their own artifact; downstream artifacts are kept. Once minted, the pinned
//! content is final and only mint (idempotent) and persist may run.

use crate::errors::PublishError;
use chrono::{DateTime, Utc};
use scholarmint_common::chain::MintReceipt;
use scholarmint_common::pinning::PinnedContent;
use scholarmint_common::types::{Network, PublicationType};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One explicitly triggered pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Pdf,
    Cover,
    Ipfs,
    Mint,
    Persist,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Pdf => "pdf",
            PipelineStep::Cover => "cover",
            PipelineStep::Ipfs => "ipfs",
            PipelineStep::Mint => "mint",
            PipelineStep::Persist => "persist",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Rendered article PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfArtifact {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// `0x`-prefixed SHA-256 of `bytes`
    pub sha256: String,
    pub page_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    Generated,
    Uploaded,
}

/// Cover image, generated or uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArtifact {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub source: CoverSource,
}

impl CoverArtifact {
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

/// A pinned metadata document and the hash bound on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedMetadata {
    pub pin: PinnedContent,
    pub hash: String,
}

impl PinnedMetadata {
    pub fn uri(&self) -> String {
        self.pin.uri()
    }
}

/// Article fields and author exactly as they were pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedArticle {
    pub title: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub license: String,
    pub publication_type: PublicationType,
    pub author_name: String,
    pub orcid_id: Option<String>,
}

/// Everything pinned by the upload step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsArtifact {
    /// Source of the persisted article row
    pub article: PinnedArticle,
    pub pdf: PinnedContent,
    pub cover: PinnedContent,
    /// Full article payload
    pub content: PinnedContent,
    pub ip_metadata: PinnedMetadata,
    pub nft_metadata: PinnedMetadata,
    pub doi: String,
    /// Network the metadata was built for; mint registers on this one
    pub network: Network,
    pub issued_at: DateTime<Utc>,
}

/// Confirmed on-chain registration
pub type MintArtifact = MintReceipt;

/// Where a draft is in the pipeline, with its artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Draft,
    PdfReady {
        pdf: PdfArtifact,
    },
    CoverReady {
        pdf: PdfArtifact,
        cover: CoverArtifact,
    },
    IpfsReady {
        pdf: PdfArtifact,
        cover: CoverArtifact,
        ipfs: IpfsArtifact,
    },
    Minted {
        pdf: PdfArtifact,
        cover: CoverArtifact,
        ipfs: IpfsArtifact,
        mint: MintArtifact,
    },
    Persisted {
        article_id: Uuid,
        doi: String,
        ip_asset_id: String,
    },
}

impl PipelineState {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineState::Draft => "draft",
            PipelineState::PdfReady { .. } => "pdf_ready",
            PipelineState::CoverReady { .. } => "cover_ready",
            PipelineState::IpfsReady { .. } => "ipfs_ready",
            PipelineState::Minted { .. } => "minted",
            PipelineState::Persisted { .. } => "persisted",
        }
    }

    pub fn pdf(&self) -> Option<&PdfArtifact> {
        match self {
            PipelineState::PdfReady { pdf }
            | PipelineState::CoverReady { pdf, .. }
            | PipelineState::IpfsReady { pdf, .. }
            | PipelineState::Minted { pdf, .. } => Some(pdf),
            _ => None,
        }
    }

    pub fn cover(&self) -> Option<&CoverArtifact> {
        match self {
            PipelineState::CoverReady { cover, .. }
            | PipelineState::IpfsReady { cover, .. }
            | PipelineState::Minted { cover, .. } => Some(cover),
            _ => None,
        }
    }

    pub fn ipfs(&self) -> Option<&IpfsArtifact> {
        match self {
            PipelineState::IpfsReady { ipfs, .. } | PipelineState::Minted { ipfs, .. } => {
                Some(ipfs)
            }
            _ => None,
        }
    }

    pub fn mint(&self) -> Option<&MintArtifact> {
        match self {
            PipelineState::Minted { mint, .. } => Some(mint),
            _ => None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, PipelineState::Persisted { .. })
    }

    /// Check that `step` may run now; no side effects happen before this
    pub fn require(&self, step: PipelineStep) -> Result<(), PublishError> {
        if let PipelineState::Persisted { article_id, .. } = self {
            return Err(PublishError::AlreadyPersisted {
                article_id: *article_id,
            });
        }
        if let PipelineState::Minted { mint, .. } = self {
            if matches!(step, PipelineStep::Pdf | PipelineStep::Cover | PipelineStep::Ipfs) {
                return Err(PublishError::AlreadyMinted {
                    ip_asset_id: mint.ip_asset_id.clone(),
                });
            }
        }

        let missing = match step {
            PipelineStep::Pdf => None,
            PipelineStep::Cover => self.pdf().is_none().then_some(PipelineStep::Pdf),
            PipelineStep::Ipfs => {
                if self.pdf().is_none() {
                    Some(PipelineStep::Pdf)
                } else if self.cover().is_none() {
                    Some(PipelineStep::Cover)
                } else {
                    None
                }
            }
            PipelineStep::Mint => self.ipfs().is_none().then_some(PipelineStep::Ipfs),
            PipelineStep::Persist => self.mint().is_none().then_some(PipelineStep::Mint),
        };

        match missing {
            Some(requires) => Err(PublishError::StepOutOfOrder { step, requires }),
            None => Ok(()),
        }
    }

    /// State after replacing or adding the PDF
    pub fn with_pdf(self, pdf: PdfArtifact) -> Result<Self, PublishError> {
        self.require(PipelineStep::Pdf)?;
        Ok(match self {
            PipelineState::CoverReady { cover, .. } => PipelineState::CoverReady { pdf, cover },
            PipelineState::IpfsReady { cover, ipfs, .. } => {
                PipelineState::IpfsReady { pdf, cover, ipfs }
            }
            _ => PipelineState::PdfReady { pdf },
        })
    }

    /// State after replacing or adding the cover
    pub fn with_cover(self, cover: CoverArtifact) -> Result<Self, PublishError> {
        self.require(PipelineStep::Cover)?;
        match self {
            PipelineState::PdfReady { pdf } | PipelineState::CoverReady { pdf, .. } => {
                Ok(PipelineState::CoverReady { pdf, cover })
            }
            PipelineState::IpfsReady { pdf, ipfs, .. } => {
                Ok(PipelineState::IpfsReady { pdf, cover, ipfs })
            }
            other => Err(out_of_order(&other, PipelineStep::Cover)),
        }
    }

    /// State after replacing or adding the pinned artifacts
    pub fn with_ipfs(self, ipfs: IpfsArtifact) -> Result<Self, PublishError> {
        self.require(PipelineStep::Ipfs)?;
        match self {
            PipelineState::CoverReady { pdf, cover } | PipelineState::IpfsReady { pdf, cover, .. } => {
                Ok(PipelineState::IpfsReady { pdf, cover, ipfs })
            }
            other => Err(out_of_order(&other, PipelineStep::Ipfs)),
        }
    }

    /// State after a confirmed mint
    pub fn with_mint(self, mint: MintArtifact) -> Result<Self, PublishError> {
        self.require(PipelineStep::Mint)?;
        match self {
            PipelineState::IpfsReady { pdf, cover, ipfs }
            | PipelineState::Minted { pdf, cover, ipfs, .. } => Ok(PipelineState::Minted {
                pdf,
                cover,
                ipfs,
                mint,
            }),
            other => Err(out_of_order(&other, PipelineStep::Mint)),
        }
    }

    /// Terminal state after the article row is written
    pub fn into_persisted(self, article_id: Uuid) -> Result<Self, PublishError> {
        self.require(PipelineStep::Persist)?;
        match self {
            PipelineState::Minted { ipfs, mint, .. } => Ok(PipelineState::Persisted {
                article_id,
                doi: ipfs.doi,
                ip_asset_id: mint.ip_asset_id,
            }),
            other => Err(out_of_order(&other, PipelineStep::Persist)),
        }
    }
}

fn out_of_order(state: &PipelineState, step: PipelineStep) -> PublishError {
    match state.require(step) {
        Err(e) => e,
        Ok(()) => PublishError::StepOutOfOrder {
            step,
            requires: step,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(tag: u8) -> PdfArtifact {
        PdfArtifact {
            bytes: vec![b'%', b'P', b'D', b'F', tag],
            sha256: format!("0x{:064x}", tag),
            page_count: 1,
        }
    }

    fn cover() -> CoverArtifact {
        CoverArtifact {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime: "image/png".to_string(),
            width: 10,
            height: 10,
            source: CoverSource::Generated,
        }
    }

    fn pin(cid: &str) -> PinnedContent {
        PinnedContent {
            cid: cid.to_string(),
            gateway_url: format!("https://gateway.pinata.cloud/ipfs/{}", cid),
            size: 1,
        }
    }

    fn ipfs() -> IpfsArtifact {
        IpfsArtifact {
            article: PinnedArticle {
                title: "Krump".to_string(),
                abstract_text: "Stomps".to_string(),
                keywords: vec!["krump".to_string()],
                license: "CC BY 4.0".to_string(),
                publication_type: PublicationType::ResearchArticle,
                author_name: "Tight Eyez".to_string(),
                orcid_id: None,
            },
            pdf: pin("pdf"),
            cover: pin("cover"),
            content: pin("content"),
            ip_metadata: PinnedMetadata {
                pin: pin("ipa"),
                hash: format!("0x{}", "1".repeat(64)),
            },
            nft_metadata: PinnedMetadata {
                pin: pin("nft"),
                hash: format!("0x{}", "2".repeat(64)),
            },
            doi: "10.KRUMPJOURNAL/article.2026.0123456789abcdef".to_string(),
            network: Network::Testnet,
            issued_at: Utc::now(),
        }
    }

    fn mint() -> MintArtifact {
        MintReceipt {
            transaction_hash: format!("0x{}", "a".repeat(64)),
            ip_asset_id: format!("0x{}", "b".repeat(40)),
            spg_contract_address: format!("0x{}", "c".repeat(40)),
            network: Network::Testnet,
            minted_at: Utc::now(),
        }
    }

    #[test]
    fn test_happy_path() {
        let state = PipelineState::Draft
            .with_pdf(pdf(1))
            .and_then(|s| s.with_cover(cover()))
            .and_then(|s| s.with_ipfs(ipfs()))
            .and_then(|s| s.with_mint(mint()))
            .unwrap();
        assert_eq!(state.stage(), "minted");

        let article_id = Uuid::new_v4();
        let done = state.into_persisted(article_id).unwrap();
        assert!(done.is_persisted());
    }

    #[test]
    fn test_mint_before_ipfs_rejected() {
        let state = PipelineState::Draft
            .with_pdf(pdf(1))
            .and_then(|s| s.with_cover(cover()))
            .unwrap();

        let err = state.require(PipelineStep::Mint).unwrap_err();
        assert!(matches!(
            err,
            PublishError::StepOutOfOrder {
                step: PipelineStep::Mint,
                requires: PipelineStep::Ipfs
            }
        ));
    }

    #[test]
    fn test_persist_before_mint_rejected() {
        let state = PipelineState::Draft
            .with_pdf(pdf(1))
            .and_then(|s| s.with_cover(cover()))
            .and_then(|s| s.with_ipfs(ipfs()))
            .unwrap();

        assert!(matches!(
            state.into_persisted(Uuid::new_v4()),
            Err(PublishError::StepOutOfOrder {
                requires: PipelineStep::Mint,
                ..
            })
        ));
    }

    #[test]
    fn test_cover_requires_pdf() {
        assert!(matches!(
            PipelineState::Draft.with_cover(cover()),
            Err(PublishError::StepOutOfOrder {
                step: PipelineStep::Cover,
                requires: PipelineStep::Pdf
            })
        ));
    }

    #[test]
    fn test_pdf_rerun_keeps_downstream() {
        let state = PipelineState::Draft
            .with_pdf(pdf(1))
            .and_then(|s| s.with_cover(cover()))
            .and_then(|s| s.with_ipfs(ipfs()))
            .unwrap();

        let rerun = state.with_pdf(pdf(2)).unwrap();
        assert_eq!(rerun.stage(), "ipfs_ready");
        assert_eq!(rerun.pdf().unwrap().bytes.last(), Some(&2));
        assert!(rerun.ipfs().is_some());
    }

    #[test]
    fn test_pinned_content_is_final_after_mint() {
        let state = PipelineState::Draft
            .with_pdf(pdf(1))
            .and_then(|s| s.with_cover(cover()))
            .and_then(|s| s.with_ipfs(ipfs()))
            .and_then(|s| s.with_mint(mint()))
            .unwrap();
        let minted_ipa = mint().ip_asset_id;

        assert!(matches!(
            state.clone().with_ipfs(ipfs()),
            Err(PublishError::AlreadyMinted { ref ip_asset_id }) if *ip_asset_id == minted_ipa
        ));
        assert!(matches!(
            state.clone().with_pdf(pdf(2)),
            Err(PublishError::AlreadyMinted { .. })
        ));
        assert!(matches!(
            state.clone().with_cover(cover()),
            Err(PublishError::AlreadyMinted { .. })
        ));
        assert!(state.require(PipelineStep::Mint).is_ok());
        assert!(state.require(PipelineStep::Persist).is_ok());
    }

    #[test]
    fn test_everything_rejected_after_persist() {
        let article_id = Uuid::new_v4();
        let state = PipelineState::Persisted {
            article_id,
            doi: "doi".to_string(),
            ip_asset_id: "ip".to_string(),
        };

        for step in [
            PipelineStep::Pdf,
            PipelineStep::Cover,
            PipelineStep::Ipfs,
            PipelineStep::Mint,
            PipelineStep::Persist,
        ] {
            assert!(matches!(
                state.require(step),
                Err(PublishError::AlreadyPersisted { article_id: id }) if id == article_id
            ));
        }
    }

    #[test]
    fn test_checkpoint_serialization() {
        let state = PipelineState::Draft
            .with_pdf(pdf(7))
            .and_then(|s| s.with_cover(cover()))
            .unwrap();

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["stage"], "cover_ready");
        assert!(value["pdf"]["bytes"].is_string());

        let restored: PipelineState = serde_json::from_value(value).unwrap();
        assert_eq!(restored, state);
    }
}
