//! Identity proof handlers (ORCID and World ID)

use axum::{extract::State, http::StatusCode, Json};
use scholarmint_common::{
    db::{
        models::{Profile, VerificationRecord},
        NewVerification,
    },
    errors::Result,
    SessionContext,
};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct OrcidCallbackRequest {
    #[validate(length(min = 1, max = 256))]
    pub code: String,

    #[validate(url)]
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WorldIdRequest {
    #[validate(length(min = 1, max = 256))]
    pub nullifier_hash: String,

    #[validate(length(min = 1, max = 256))]
    pub merkle_root: String,

    #[validate(length(min = 1, max = 4096))]
    pub proof: String,
}

/// Exchange an ORCID authorization code and mark the caller's profile verified
pub async fn orcid_callback(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(request): Json<OrcidCallbackRequest>,
) -> Result<Json<Profile>> {
    request.validate()?;

    let identity = state
        .orcid
        .exchange_code(&request.code, &request.redirect_uri)
        .await?;

    state
        .identities
        .ensure_profile(ctx.principal_id, &ctx.wallet_lower())
        .await?;
    let profile = state
        .identities
        .record_orcid(
            ctx.principal_id,
            &identity.orcid_id,
            identity.display_name.as_deref(),
        )
        .await?;

    tracing::info!(
        principal = %ctx.principal_id,
        orcid_id = %identity.orcid_id,
        provider = state.orcid.name(),
        "ORCID identity verified"
    );

    Ok(Json(profile))
}

/// Record a World ID proof for the caller
pub async fn world_id(
    State(state): State<AppState>,
    ctx: SessionContext,
    Json(request): Json<WorldIdRequest>,
) -> Result<(StatusCode, Json<VerificationRecord>)> {
    request.validate()?;

    state
        .identities
        .ensure_profile(ctx.principal_id, &ctx.wallet_lower())
        .await?;
    let record = state
        .identities
        .record_verification(NewVerification {
            user_id: ctx.principal_id,
            nullifier_hash: request.nullifier_hash,
            merkle_root: request.merkle_root,
            proof: request.proof,
        })
        .await?;

    tracing::info!(principal = %ctx.principal_id, "World ID verification recorded");

    Ok((StatusCode::CREATED, Json(record)))
}
