//! Domain enums shared by storage, metadata and the pipeline.

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target chain network for minting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Human-readable label used in metadata attributes
    pub fn label(&self) -> &'static str {
        match self {
            Network::Testnet => "Story Aeneid Testnet",
            Network::Mainnet => "Story Mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" | "aeneid" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(AppError::InvalidFormat {
                message: format!("Unknown network '{}'", other),
            }),
        }
    }
}

/// Kind of publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationType {
    #[default]
    ResearchArticle,
    Review,
    Perspective,
    Preprint,
}

impl PublicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationType::ResearchArticle => "research_article",
            PublicationType::Review => "review",
            PublicationType::Perspective => "perspective",
            PublicationType::Preprint => "preprint",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PublicationType::ResearchArticle => "Research Article",
            PublicationType::Review => "Review",
            PublicationType::Perspective => "Perspective",
            PublicationType::Preprint => "Preprint",
        }
    }
}

impl fmt::Display for PublicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "research_article" => Ok(PublicationType::ResearchArticle),
            "review" => Ok(PublicationType::Review),
            "perspective" => Ok(PublicationType::Perspective),
            "preprint" => Ok(PublicationType::Preprint),
            other => Err(AppError::InvalidFormat {
                message: format!("Unknown publication type '{}'", other),
            }),
        }
    }
}

/// Article lifecycle status
///
/// `pending -> minting -> minted -> published`; any non-terminal state may
/// move to `failed`, and a failed article may be retried from `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Pending,
    Minting,
    Minted,
    Published,
    Failed,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Minting => "minting",
            ArticleStatus::Minted => "minted",
            ArticleStatus::Published => "published",
            ArticleStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: ArticleStatus) -> bool {
        use ArticleStatus::*;
        match (self, next) {
            (Pending, Minting) | (Minting, Minted) | (Minted, Published) => true,
            (Failed, Pending) => true,
            (Published, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl From<String> for ArticleStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "minting" => ArticleStatus::Minting,
            "minted" => ArticleStatus::Minted,
            "published" => ArticleStatus::Published,
            "failed" => ArticleStatus::Failed,
            _ => ArticleStatus::Pending,
        }
    }
}

impl From<ArticleStatus> for String {
    fn from(status: ArticleStatus) -> Self {
        status.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("Aeneid".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("sepolia".parse::<Network>().is_err());
    }

    #[test]
    fn test_publication_type_roundtrip_names() {
        for t in [
            PublicationType::ResearchArticle,
            PublicationType::Review,
            PublicationType::Perspective,
            PublicationType::Preprint,
        ] {
            assert_eq!(t.as_str().parse::<PublicationType>().unwrap(), t);
        }
        assert!("essay".parse::<PublicationType>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use ArticleStatus::*;
        assert!(Pending.can_transition_to(Minting));
        assert!(Minted.can_transition_to(Published));
        assert!(Minting.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Published));
        assert!(!Published.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
    }
}
