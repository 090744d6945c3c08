//! Storage traits used by the pipeline, ownership guard and gateway.
//!
//! `Repository` implements them over Postgres; `MemoryStore` implements them
//! in memory for tests and local runs. Both honor the same contracts:
//! claim/link are single predicate-guarded updates returning the affected
//! row count, and publication persistence is all-or-nothing.

use crate::db::models::{Article, ArticleAuthor, Draft, Profile, VerificationRecord};
use crate::errors::{AppError, Result};
use crate::identifiers::LinkedIdentifier;
use crate::types::{ArticleStatus, Network, PublicationType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A fully published article ready to insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub license: Option<String>,
    pub publication_type: PublicationType,
    pub ipfs_hash: String,
    pub ipfs_gateway_url: String,
    pub pdf_ipfs_hash: Option<String>,
    pub pdf_gateway_url: Option<String>,
    pub cover_image_ipfs: Option<String>,
    pub ipa_metadata_uri: String,
    pub ipa_metadata_hash: String,
    pub nft_metadata_uri: String,
    pub nft_metadata_hash: String,
    pub network: Network,
    pub ip_asset_id: String,
    pub transaction_hash: String,
    pub spg_contract_address: String,
    pub minted_at: DateTime<Utc>,
    pub doi: String,
    pub wallet_address: Option<String>,
    pub status: ArticleStatus,
}

impl NewArticle {
    /// Row as it will be stored
    pub fn into_model(self, now: DateTime<Utc>) -> Article {
        let now: DateTimeWithTimeZone = now.into();
        Article {
            id: self.id,
            author_id: self.author_id,
            title: self.title,
            abstract_text: self.abstract_text,
            keywords: self.keywords,
            license: self.license,
            publication_type: self.publication_type.as_str().to_string(),
            ipfs_hash: Some(self.ipfs_hash),
            ipfs_gateway_url: Some(self.ipfs_gateway_url),
            pdf_ipfs_hash: self.pdf_ipfs_hash,
            pdf_gateway_url: self.pdf_gateway_url,
            cover_image_ipfs: self.cover_image_ipfs,
            ipa_metadata_uri: Some(self.ipa_metadata_uri),
            ipa_metadata_hash: Some(self.ipa_metadata_hash),
            nft_metadata_uri: Some(self.nft_metadata_uri),
            nft_metadata_hash: Some(self.nft_metadata_hash),
            network: self.network.as_str().to_string(),
            ip_asset_id: Some(self.ip_asset_id),
            transaction_hash: Some(self.transaction_hash),
            spg_contract_address: Some(self.spg_contract_address),
            minted_at: Some(self.minted_at.into()),
            doi: Some(self.doi),
            zenodo_doi: None,
            wallet_address: self.wallet_address.map(|w| w.to_ascii_lowercase()),
            status: String::from(self.status),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An author row to insert alongside an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticleAuthor {
    pub author_name: String,
    pub author_order: i32,
    pub orcid_id: Option<String>,
}

impl NewArticleAuthor {
    pub fn into_model(self, article_id: Uuid, now: DateTime<Utc>) -> ArticleAuthor {
        ArticleAuthor {
            id: Uuid::new_v4(),
            article_id,
            author_name: self.author_name,
            author_order: self.author_order,
            orcid_id: self.orcid_id,
            created_at: now.into(),
        }
    }
}

/// Check that author orders are 1-based and unique
pub fn validate_authors(authors: &[NewArticleAuthor]) -> Result<()> {
    if authors.is_empty() {
        return Err(AppError::validation("authors", "At least one author is required"));
    }
    let mut seen = HashSet::new();
    for author in authors {
        if author.author_order < 1 {
            return Err(AppError::validation("author_order", "Author order starts at 1"));
        }
        if !seen.insert(author.author_order) {
            return Err(AppError::validation(
                "author_order",
                format!("Duplicate author order {}", author.author_order),
            ));
        }
    }
    Ok(())
}

/// Sort authors for display
pub fn sort_authors(authors: &mut [ArticleAuthor]) {
    authors.sort_by_key(|a| a.author_order);
}

/// Draft fields written by auto-save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftUpsert {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// A World ID proof to record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVerification {
    pub user_id: Uuid,
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub proof: String,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert the article and its authors in one transaction
    async fn persist_publication(
        &self,
        article: NewArticle,
        authors: Vec<NewArticleAuthor>,
    ) -> Result<Article>;

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>>;

    async fn article_exists(&self, id: Uuid) -> Result<bool>;

    /// Newest first, with the total count
    async fn list_articles(&self, offset: u64, limit: u64) -> Result<(Vec<Article>, u64)>;

    /// Authors sorted by `author_order`
    async fn authors_for(&self, article_id: Uuid) -> Result<Vec<ArticleAuthor>>;

    /// `set wallet_address = wallet where id = ? and wallet_address is null`
    async fn claim_article(&self, id: Uuid, wallet: &str) -> Result<u64>;

    /// Write the identifier where `lower(wallet_address) = lower(wallet)`
    async fn link_identifier(
        &self,
        id: Uuid,
        wallet: &str,
        identifier: &LinkedIdentifier,
    ) -> Result<u64>;
}

#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Insert or update the draft, refreshing `last_saved_at`
    async fn save_draft(&self, draft: DraftUpsert) -> Result<Draft>;

    async fn find_draft(&self, id: Uuid) -> Result<Option<Draft>>;

    /// Returns whether a row was deleted
    async fn delete_draft(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Create the profile if missing and record its wallet
    async fn ensure_profile(&self, id: Uuid, wallet: &str) -> Result<Profile>;

    /// Mark the profile's ORCID identity as verified
    async fn record_orcid(&self, id: Uuid, orcid_id: &str, orcid_name: Option<&str>) -> Result<Profile>;

    /// Insert a verification; a reused nullifier is a `Duplicate`
    async fn record_verification(&self, record: NewVerification) -> Result<VerificationRecord>;

    async fn has_verification(&self, user_id: Uuid) -> Result<bool>;
}
