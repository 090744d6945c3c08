//! In-memory storage backend
//!
//! Implements the same contracts as `Repository`. Each conditional update
//! runs under one write lock, which gives it the same atomicity as the SQL
//! `UPDATE ... WHERE`.

use crate::db::models::{Article, ArticleAuthor, Draft, Profile, VerificationRecord};
use crate::db::store::{
    sort_authors, validate_authors, ArticleStore, DraftStore, DraftUpsert, IdentityStore,
    NewArticle, NewArticleAuthor, NewVerification,
};
use crate::errors::{AppError, Result};
use crate::identifiers::{LinkKind, LinkedIdentifier};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    articles: HashMap<Uuid, Article>,
    authors: Vec<ArticleAuthor>,
    drafts: HashMap<Uuid, Draft>,
    profiles: HashMap<Uuid, Profile>,
    verifications: Vec<VerificationRecord>,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn article_count(&self) -> usize {
        self.tables.read().await.articles.len()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn persist_publication(
        &self,
        article: NewArticle,
        authors: Vec<NewArticleAuthor>,
    ) -> Result<Article> {
        validate_authors(&authors)?;

        let mut tables = self.tables.write().await;
        if tables.articles.contains_key(&article.id) {
            return Err(AppError::Duplicate {
                message: format!("Article {} already exists", article.id),
            });
        }

        let now = Utc::now();
        let model = article.into_model(now);
        let article_id = model.id;

        tables.articles.insert(article_id, model.clone());
        tables
            .authors
            .extend(authors.into_iter().map(|a| a.into_model(article_id, now)));

        Ok(model)
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>> {
        Ok(self.tables.read().await.articles.get(&id).cloned())
    }

    async fn article_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.read().await.articles.contains_key(&id))
    }

    async fn list_articles(&self, offset: u64, limit: u64) -> Result<(Vec<Article>, u64)> {
        let tables = self.tables.read().await;
        let mut articles: Vec<Article> = tables.articles.values().cloned().collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = articles.len() as u64;
        let page = articles
            .into_iter()
            .skip(offset as usize)
            .take(limit.max(1) as usize)
            .collect();

        Ok((page, total))
    }

    async fn authors_for(&self, article_id: Uuid) -> Result<Vec<ArticleAuthor>> {
        let tables = self.tables.read().await;
        let mut authors: Vec<ArticleAuthor> = tables
            .authors
            .iter()
            .filter(|a| a.article_id == article_id)
            .cloned()
            .collect();
        sort_authors(&mut authors);
        Ok(authors)
    }

    async fn claim_article(&self, id: Uuid, wallet: &str) -> Result<u64> {
        let mut tables = self.tables.write().await;
        match tables.articles.get_mut(&id) {
            Some(article) if article.wallet_address.is_none() => {
                article.wallet_address = Some(wallet.to_ascii_lowercase());
                article.updated_at = Utc::now().into();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn link_identifier(
        &self,
        id: Uuid,
        wallet: &str,
        identifier: &LinkedIdentifier,
    ) -> Result<u64> {
        let caller = wallet.to_ascii_lowercase();
        let mut tables = self.tables.write().await;

        let Some(article) = tables.articles.get_mut(&id) else {
            return Ok(0);
        };
        let owned = article
            .wallet_address
            .as_deref()
            .is_some_and(|owner| owner.to_ascii_lowercase() == caller);
        if !owned {
            return Ok(0);
        }

        let value = Some(identifier.value().to_string());
        match identifier.kind() {
            LinkKind::ZenodoDoi => article.zenodo_doi = value,
            LinkKind::IpAssetId => article.ip_asset_id = value,
            LinkKind::TransactionHash => article.transaction_hash = value,
        }
        article.updated_at = Utc::now().into();
        Ok(1)
    }
}

#[async_trait]
impl DraftStore for MemoryStore {
    async fn save_draft(&self, draft: DraftUpsert) -> Result<Draft> {
        let now = Utc::now().into();
        let mut tables = self.tables.write().await;

        let row = match tables.drafts.get_mut(&draft.id) {
            Some(existing) => {
                if existing.author_id != draft.author_id {
                    return Err(AppError::Forbidden {
                        message: "Draft belongs to another author".to_string(),
                    });
                }
                existing.title = draft.title;
                existing.content = draft.content;
                existing.metadata = draft.metadata;
                existing.last_saved_at = now;
                existing.clone()
            }
            None => {
                let row = Draft {
                    id: draft.id,
                    author_id: draft.author_id,
                    title: draft.title,
                    content: draft.content,
                    metadata: draft.metadata,
                    last_saved_at: now,
                    created_at: now,
                };
                tables.drafts.insert(row.id, row.clone());
                row
            }
        };

        Ok(row)
    }

    async fn find_draft(&self, id: Uuid) -> Result<Option<Draft>> {
        Ok(self.tables.read().await.drafts.get(&id).cloned())
    }

    async fn delete_draft(&self, id: Uuid) -> Result<bool> {
        Ok(self.tables.write().await.drafts.remove(&id).is_some())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn ensure_profile(&self, id: Uuid, wallet: &str) -> Result<Profile> {
        let now = Utc::now().into();
        let mut tables = self.tables.write().await;
        let profile = tables.profiles.entry(id).or_insert_with(|| Profile {
            id,
            wallet_address: None,
            orcid_id: None,
            orcid_name: None,
            orcid_verified: false,
            created_at: now,
            updated_at: now,
        });
        profile.wallet_address = Some(wallet.to_ascii_lowercase());
        profile.updated_at = now;
        Ok(profile.clone())
    }

    async fn record_orcid(
        &self,
        id: Uuid,
        orcid_id: &str,
        orcid_name: Option<&str>,
    ) -> Result<Profile> {
        let mut tables = self.tables.write().await;
        let profile = tables.profiles.get_mut(&id).ok_or_else(|| AppError::NotFound {
            resource_type: "Profile".to_string(),
            id: id.to_string(),
        })?;

        profile.orcid_id = Some(orcid_id.to_string());
        profile.orcid_name = orcid_name.map(str::to_string);
        profile.orcid_verified = true;
        profile.updated_at = Utc::now().into();
        Ok(profile.clone())
    }

    async fn record_verification(&self, record: NewVerification) -> Result<VerificationRecord> {
        let mut tables = self.tables.write().await;
        if tables
            .verifications
            .iter()
            .any(|v| v.nullifier_hash == record.nullifier_hash)
        {
            return Err(AppError::Duplicate {
                message: "This World ID proof has already been used".to_string(),
            });
        }

        let row = VerificationRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            nullifier_hash: record.nullifier_hash,
            merkle_root: record.merkle_root,
            proof: record.proof,
            verified_at: Utc::now().into(),
        };
        tables.verifications.push(row.clone());
        Ok(row)
    }

    async fn has_verification(&self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .verifications
            .iter()
            .any(|v| v.user_id == user_id))
    }
}
