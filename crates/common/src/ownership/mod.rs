//! Article claim and identifier linking
//!
//! Both operations are a single conditional update; the caller never reads
//! ownership first and decides in application code.

use crate::auth::SessionContext;
use crate::db::models::Article;
use crate::db::ArticleStore;
use crate::errors::{AppError, Result};
use crate::identifiers::{LinkKind, LinkedIdentifier};
use crate::metrics::record_ownership;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Guards claim and link updates on published articles
#[derive(Clone)]
pub struct OwnershipGuard {
    store: Arc<dyn ArticleStore>,
}

impl OwnershipGuard {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    /// Take ownership of an unclaimed article
    #[instrument(skip(self, session), fields(principal = %session.principal_id))]
    pub async fn claim(&self, session: &SessionContext, article_id: Uuid) -> Result<Article> {
        let wallet = session.wallet_lower();
        let updated = self.store.claim_article(article_id, &wallet).await?;

        if updated == 0 {
            return if self.store.article_exists(article_id).await? {
                warn!(%article_id, "Claim rejected, article already claimed");
                record_ownership("claim", "already_claimed");
                Err(AppError::AlreadyClaimed {
                    id: article_id.to_string(),
                })
            } else {
                record_ownership("claim", "not_found");
                Err(AppError::ArticleNotFound {
                    id: article_id.to_string(),
                })
            };
        }

        record_ownership("claim", "ok");
        info!(%article_id, "Article claimed");
        self.reload(article_id).await
    }

    /// Normalize `raw` as `kind` and write it if the caller owns the article
    #[instrument(skip(self, session, raw), fields(principal = %session.principal_id, kind = kind.as_str()))]
    pub async fn link(
        &self,
        session: &SessionContext,
        article_id: Uuid,
        kind: LinkKind,
        raw: &str,
    ) -> Result<LinkedIdentifier> {
        let identifier = kind.parse(raw)?;

        let updated = self
            .store
            .link_identifier(article_id, &session.wallet_address, &identifier)
            .await?;

        if updated == 0 {
            record_ownership(kind.as_str(), "not_owner");
            return Err(AppError::NotOwner);
        }

        record_ownership(kind.as_str(), "ok");
        info!(%article_id, value = identifier.value(), "Identifier linked");
        Ok(identifier)
    }

    async fn reload(&self, article_id: Uuid) -> Result<Article> {
        self.store
            .find_article(article_id)
            .await?
            .ok_or_else(|| AppError::ArticleNotFound {
                id: article_id.to_string(),
            })
    }
}
