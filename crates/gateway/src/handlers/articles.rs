//! Published article handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use scholarmint_common::{
    chain::NetworkProfile,
    db::models::{Article, ArticleAuthor},
    errors::{AppError, Result},
    pinning::convert_ipfs_to_gateway,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ListQuery {
    #[validate(range(min = 1))]
    #[serde(default = "default_page")]
    pub page: u64,

    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

#[derive(Serialize)]
pub struct ArticleListResponse {
    pub articles: Vec<Article>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Gateway and explorer links for a minted article
#[derive(Debug, Serialize)]
pub struct ArticleLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_url: Option<String>,
}

#[derive(Serialize)]
pub struct ArticleResponse {
    #[serde(flatten)]
    pub article: Article,
    pub claimed: bool,
    pub authors: Vec<ArticleAuthor>,
    pub links: ArticleLinks,
}

/// Newest articles first
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ArticleListResponse>> {
    query.validate()?;

    let offset = (query.page - 1) * query.per_page;
    let (articles, total) = state.articles.list_articles(offset, query.per_page).await?;

    Ok(Json(ArticleListResponse {
        articles,
        total,
        page: query.page,
        per_page: query.per_page,
    }))
}

/// Article with its ordered authors
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArticleResponse>> {
    let article = state
        .articles
        .find_article(id)
        .await?
        .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

    let authors = state.articles.authors_for(id).await?;
    let links = links_for(&article, &state.config.pinning.gateway_base);

    Ok(Json(ArticleResponse {
        claimed: article.is_claimed(),
        article,
        authors,
        links,
    }))
}

fn links_for(article: &Article, gateway_base: &str) -> ArticleLinks {
    let profile = NetworkProfile::for_network(article.network());
    let pdf_url = article
        .pdf_gateway_url
        .as_deref()
        .or(article.pdf_ipfs_hash.as_deref())
        .map(|reference| convert_ipfs_to_gateway(reference, gateway_base));

    ArticleLinks {
        pdf_url,
        cover_url: article
            .cover_image_ipfs
            .as_deref()
            .map(|cid| convert_ipfs_to_gateway(cid, gateway_base)),
        ip_asset_url: article.ip_asset_id.as_deref().map(|id| profile.ip_asset_url(id)),
        transaction_url: article
            .transaction_hash
            .as_deref()
            .map(|tx| profile.transaction_url(tx)),
    }
}
