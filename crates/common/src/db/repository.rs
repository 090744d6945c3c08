//! Repository pattern for database operations
//!
//! Postgres-backed implementation of the storage traits. Ownership updates
//! are single conditional `UPDATE`s so the predicate is evaluated atomically
//! by the database.

use crate::db::models::*;
use crate::db::store::{
    validate_authors, ArticleStore, DraftStore, DraftUpsert, IdentityStore, NewArticle,
    NewArticleAuthor, NewVerification,
};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::identifiers::{LinkKind, LinkedIdentifier};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, SqlErr, Statement,
    TransactionTrait,
};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    fn now() -> DateTimeWithTimeZone {
        chrono::Utc::now().into()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

// ============================================================================
// Article Operations
// ============================================================================

#[async_trait]
impl ArticleStore for Repository {
    #[instrument(skip(self, article, authors), fields(article_id = %article.id))]
    async fn persist_publication(
        &self,
        article: NewArticle,
        authors: Vec<NewArticleAuthor>,
    ) -> Result<Article> {
        validate_authors(&authors)?;

        let now = chrono::Utc::now();
        let article_id = article.id;
        let model = article.into_model(now);

        let txn = self.write_conn().begin().await?;

        let inserted = model.into_active_model().reset_all().insert(&txn).await?;

        for author in authors {
            let row = ArticleAuthorActiveModel {
                id: Set(Uuid::new_v4()),
                article_id: Set(article_id),
                author_name: Set(author.author_name),
                author_order: Set(author.author_order),
                orcid_id: Set(author.orcid_id),
                created_at: Set(now.into()),
            };
            row.insert(&txn).await?;
        }

        txn.commit().await?;
        debug!("Publication persisted");

        Ok(inserted)
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<Article>> {
        ArticleEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn article_exists(&self, id: Uuid) -> Result<bool> {
        // Read from primary: callers use this right after a failed write
        let count = ArticleEntity::find()
            .filter(ArticleColumn::Id.eq(id))
            .count(self.write_conn())
            .await?;
        Ok(count > 0)
    }

    async fn list_articles(&self, offset: u64, limit: u64) -> Result<(Vec<Article>, u64)> {
        let limit = limit.max(1);
        let paginator = ArticleEntity::find()
            .order_by_desc(ArticleColumn::CreatedAt)
            .paginate(self.read_conn(), limit);

        let total = paginator.num_items().await?;
        let articles = paginator.fetch_page(offset / limit).await?;

        Ok((articles, total))
    }

    async fn authors_for(&self, article_id: Uuid) -> Result<Vec<ArticleAuthor>> {
        ArticleAuthorEntity::find()
            .filter(ArticleAuthorColumn::ArticleId.eq(article_id))
            .order_by_asc(ArticleAuthorColumn::AuthorOrder)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self, wallet))]
    async fn claim_article(&self, id: Uuid, wallet: &str) -> Result<u64> {
        let result = ArticleEntity::update_many()
            .col_expr(ArticleColumn::WalletAddress, Expr::value(wallet.to_ascii_lowercase()))
            .col_expr(ArticleColumn::UpdatedAt, Expr::value(Self::now()))
            .filter(ArticleColumn::Id.eq(id))
            .filter(ArticleColumn::WalletAddress.is_null())
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    #[instrument(skip(self, wallet, identifier), fields(kind = identifier.kind().as_str()))]
    async fn link_identifier(
        &self,
        id: Uuid,
        wallet: &str,
        identifier: &LinkedIdentifier,
    ) -> Result<u64> {
        let column = match identifier.kind() {
            LinkKind::ZenodoDoi => ArticleColumn::ZenodoDoi,
            LinkKind::IpAssetId => ArticleColumn::IpAssetId,
            LinkKind::TransactionHash => ArticleColumn::TransactionHash,
        };

        let result = ArticleEntity::update_many()
            .col_expr(column, Expr::value(identifier.value().to_string()))
            .col_expr(ArticleColumn::UpdatedAt, Expr::value(Self::now()))
            .filter(ArticleColumn::Id.eq(id))
            .filter(
                Expr::expr(Func::lower(Expr::col(ArticleColumn::WalletAddress)))
                    .eq(wallet.to_ascii_lowercase()),
            )
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }
}

// ============================================================================
// Draft Operations
// ============================================================================

#[async_trait]
impl DraftStore for Repository {
    async fn save_draft(&self, draft: DraftUpsert) -> Result<Draft> {
        let now = chrono::Utc::now();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO article_drafts (id, author_id, title, content, metadata, last_saved_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                metadata = EXCLUDED.metadata,
                last_saved_at = EXCLUDED.last_saved_at
            WHERE article_drafts.author_id = EXCLUDED.author_id
            RETURNING *
            "#,
            vec![
                draft.id.into(),
                draft.author_id.into(),
                draft.title.into(),
                draft.content.into(),
                draft.metadata.into(),
                now.into(),
            ],
        );

        DraftEntity::find()
            .from_raw_sql(stmt)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::Forbidden {
                message: "Draft belongs to another author".to_string(),
            })
    }

    async fn find_draft(&self, id: Uuid) -> Result<Option<Draft>> {
        DraftEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_draft(&self, id: Uuid) -> Result<bool> {
        let result = DraftEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

// ============================================================================
// Identity Operations
// ============================================================================

#[async_trait]
impl IdentityStore for Repository {
    async fn find_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        ProfileEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn ensure_profile(&self, id: Uuid, wallet: &str) -> Result<Profile> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO profiles (id, wallet_address, orcid_verified, created_at, updated_at)
            VALUES ($1, $2, FALSE, $3, $3)
            ON CONFLICT (id) DO UPDATE SET
                wallet_address = EXCLUDED.wallet_address,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
            vec![id.into(), wallet.to_ascii_lowercase().into(), Self::now().into()],
        );

        ProfileEntity::find()
            .from_raw_sql(stmt)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::Internal {
                message: "Profile upsert returned no row".to_string(),
            })
    }

    async fn record_orcid(
        &self,
        id: Uuid,
        orcid_id: &str,
        orcid_name: Option<&str>,
    ) -> Result<Profile> {
        let mut profile: ProfileActiveModel = ProfileEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "Profile".to_string(),
                id: id.to_string(),
            })?
            .into();

        profile.orcid_id = Set(Some(orcid_id.to_string()));
        profile.orcid_name = Set(orcid_name.map(str::to_string));
        profile.orcid_verified = Set(true);
        profile.updated_at = Set(Self::now());

        profile.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn record_verification(&self, record: NewVerification) -> Result<VerificationRecord> {
        let row = VerificationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(record.user_id),
            nullifier_hash: Set(record.nullifier_hash),
            merkle_root: Set(record.merkle_root),
            proof: Set(record.proof),
            verified_at: Set(Self::now()),
        };

        row.insert(self.write_conn()).await.map_err(map_unique_violation)
    }

    async fn has_verification(&self, user_id: Uuid) -> Result<bool> {
        let count = VerificationEntity::find()
            .filter(VerificationColumn::UserId.eq(user_id))
            .count(self.read_conn())
            .await?;
        Ok(count > 0)
    }
}

fn map_unique_violation(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::Duplicate {
            message: "This World ID proof has already been used".to_string(),
        },
        _ => err.into(),
    }
}
