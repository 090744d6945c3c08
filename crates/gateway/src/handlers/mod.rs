//! API handlers module

pub mod articles;
pub mod drafts;
pub mod health;
pub mod identity;
pub mod ownership;

use crate::AppState;
use scholarmint_common::{errors::Result, SessionContext};

/// Attach the caller's ORCID identity and World ID status, creating the profile on first use
pub async fn with_profile_identity(state: &AppState, ctx: SessionContext) -> Result<SessionContext> {
    let profile = state
        .identities
        .ensure_profile(ctx.principal_id, &ctx.wallet_lower())
        .await?;
    let human_verified = state.identities.has_verification(ctx.principal_id).await?;
    Ok(ctx
        .with_identity(profile.verified_identity())
        .with_human_verification(human_verified))
}
