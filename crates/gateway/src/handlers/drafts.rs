//! Publication pipeline handlers
//!
//! One route per pipeline step. Each step runs to completion inside the
//! request and returns the session's current view.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use scholarmint_common::{
    errors::{AppError, Result},
    SessionContext,
};
use scholarmint_publisher::{ComposeInput, PipelineView};
use serde::Deserialize;
use uuid::Uuid;

use super::with_profile_identity;
use crate::AppState;

/// Optional cover upload; an empty body generates a cover
#[derive(Debug, Default, Deserialize)]
pub struct CoverRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

/// Open a publication session
pub async fn start_draft(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(compose): Json<ComposeInput>,
) -> Result<(StatusCode, Json<PipelineView>)> {
    let view = state.publisher.start(&ctx, compose).await?;

    tracing::info!(
        draft_id = %view.draft_id,
        principal = %ctx.principal_id,
        "Publication session started"
    );

    Ok((StatusCode::CREATED, Json(view)))
}

/// Replace the compose fields of a draft
pub async fn update_draft(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
    Json(compose): Json<ComposeInput>,
) -> Result<Json<PipelineView>> {
    state
        .publisher
        .update(&ctx, id, compose)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

/// Pipeline status
pub async fn get_draft(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>> {
    state
        .publisher
        .status(&ctx, id)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

pub async fn generate_pdf(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>> {
    let ctx = with_profile_identity(&state, ctx).await?;
    state
        .publisher
        .generate_pdf(&ctx, id)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

pub async fn generate_cover(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<PipelineView>> {
    let upload = decode_cover_body(&body)?;
    let ctx = with_profile_identity(&state, ctx).await?;
    state
        .publisher
        .generate_cover(&ctx, id, upload)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

pub async fn upload_to_ipfs(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>> {
    let ctx = with_profile_identity(&state, ctx).await?;
    state
        .publisher
        .upload_to_ipfs(&ctx, id)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

pub async fn mint(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>> {
    state
        .publisher
        .mint(&ctx, id)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

pub async fn persist(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>> {
    let ctx = with_profile_identity(&state, ctx).await?;
    state
        .publisher
        .persist(&ctx, id)
        .await
        .map(Json)
        .map_err(|e| e.into_app_error(id))
}

/// Read the optional cover upload from a request body
///
/// Accepts `{ "image_base64": "..." }` with or without a `data:` URL prefix.
fn decode_cover_body(body: &[u8]) -> Result<Option<Vec<u8>>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let request: CoverRequest = serde_json::from_slice(body).map_err(|e| AppError::InvalidFormat {
        message: format!("Cover request must be JSON: {}", e),
    })?;

    let Some(encoded) = request.image_base64.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };

    let payload = match encoded.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded.as_str(),
    };

    STANDARD
        .decode(payload.trim())
        .map(Some)
        .map_err(|_| AppError::InvalidFormat {
            message: "image_base64 is not valid base64".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_generates_cover() {
        assert_eq!(decode_cover_body(b"").unwrap(), None);
        assert_eq!(decode_cover_body(b"  \n").unwrap(), None);
        assert_eq!(decode_cover_body(b"{}").unwrap(), None);
        assert_eq!(decode_cover_body(br#"{"image_base64":""}"#).unwrap(), None);
    }

    #[test]
    fn test_plain_base64() {
        let body = format!(r#"{{"image_base64":"{}"}}"#, STANDARD.encode(b"\x89PNG"));
        assert_eq!(decode_cover_body(body.as_bytes()).unwrap(), Some(b"\x89PNG".to_vec()));
    }

    #[test]
    fn test_data_url_prefix_stripped() {
        let body = format!(
            r#"{{"image_base64":"data:image/png;base64,{}"}}"#,
            STANDARD.encode(b"cover")
        );
        assert_eq!(decode_cover_body(body.as_bytes()).unwrap(), Some(b"cover".to_vec()));
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(
            decode_cover_body(b"not json"),
            Err(AppError::InvalidFormat { .. })
        ));
        assert!(matches!(
            decode_cover_body(br#"{"image_base64":"***"}"#),
            Err(AppError::InvalidFormat { .. })
        ));
    }
}
