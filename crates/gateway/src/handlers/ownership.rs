//! Claim and link handlers

use axum::{
    extract::{Path, State},
    Json,
};
use scholarmint_common::{
    db::models::Article,
    errors::{AppError, Result},
    identifiers::{LinkKind, LinkedIdentifier},
    SessionContext,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct LinkRequest {
    #[validate(length(min = 1, max = 512))]
    pub value: String,
}

#[derive(Serialize)]
pub struct LinkResponse {
    pub article_id: Uuid,
    pub identifier: LinkedIdentifier,
}

/// Claim an unowned article for the caller's wallet
pub async fn claim(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>> {
    let article = state.ownership.claim(&ctx, id).await?;
    Ok(Json(article))
}

/// Attach an external identifier to an owned article
pub async fn link(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path((id, kind)): Path<(Uuid, String)>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<LinkResponse>> {
    let kind = link_kind(&kind)?;
    request.validate()?;

    let identifier = state.ownership.link(&ctx, id, kind, &request.value).await?;

    Ok(Json(LinkResponse {
        article_id: id,
        identifier,
    }))
}

/// Route segment → link kind
fn link_kind(segment: &str) -> Result<LinkKind> {
    match segment {
        "zenodo" => Ok(LinkKind::ZenodoDoi),
        "ip-asset" => Ok(LinkKind::IpAssetId),
        "transaction" => Ok(LinkKind::TransactionHash),
        other => Err(AppError::Validation {
            message: format!(
                "Unknown link kind '{}'; expected zenodo, ip-asset or transaction",
                other
            ),
            field: Some("kind".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_kind_segments() {
        assert_eq!(link_kind("zenodo").unwrap(), LinkKind::ZenodoDoi);
        assert_eq!(link_kind("ip-asset").unwrap(), LinkKind::IpAssetId);
        assert_eq!(link_kind("transaction").unwrap(), LinkKind::TransactionHash);
        assert!(matches!(link_kind("doi"), Err(AppError::Validation { .. })));
        assert!(link_kind("Zenodo").is_err());
    }
}
