//! Publisher error types

use crate::pipeline::PipelineStep;
use scholarmint_common::errors::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Step '{step}' requires '{requires}' to complete first")]
    StepOutOfOrder {
        step: PipelineStep,
        requires: PipelineStep,
    },

    #[error("A pipeline step is already running for draft {draft_id}")]
    StepInFlight { draft_id: Uuid },

    #[error("Draft already published as article {article_id}")]
    AlreadyPersisted { article_id: Uuid },

    #[error("Draft already minted as IP asset {ip_asset_id}")]
    AlreadyMinted { ip_asset_id: String },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: PipelineStep,
        #[source]
        source: AppError,
    },

    /// Rejected before the step started (session, validation, gate)
    #[error(transparent)]
    Rejected(#[from] AppError),
}

impl PublishError {
    pub fn failed(step: PipelineStep) -> impl FnOnce(AppError) -> PublishError {
        move |source| PublishError::StepFailed { step, source }
    }

    /// Convert with the draft id available for the response
    pub fn into_app_error(self, draft_id: Uuid) -> AppError {
        match self {
            PublishError::AlreadyPersisted { article_id } => AppError::AlreadyPersisted {
                draft_id: draft_id.to_string(),
                article_id: article_id.to_string(),
            },
            PublishError::AlreadyMinted { ip_asset_id } => AppError::AlreadyMinted {
                draft_id: draft_id.to_string(),
                ip_asset_id,
            },
            other => other.into(),
        }
    }
}

impl From<PublishError> for AppError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::StepOutOfOrder { step, requires } => AppError::StepOutOfOrder {
                step: step.to_string(),
                requires: requires.to_string(),
            },
            PublishError::StepInFlight { draft_id } => AppError::StepInFlight {
                draft_id: draft_id.to_string(),
            },
            PublishError::AlreadyPersisted { article_id } => AppError::AlreadyPersisted {
                draft_id: String::new(),
                article_id: article_id.to_string(),
            },
            PublishError::AlreadyMinted { ip_asset_id } => AppError::AlreadyMinted {
                draft_id: String::new(),
                ip_asset_id,
            },
            PublishError::StepFailed { step, source } => with_step(step, source),
            PublishError::Rejected(e) => e,
        }
    }
}

/// Prefix the step name onto message-bearing errors, keeping the variant
fn with_step(step: PipelineStep, source: AppError) -> AppError {
    let tag = |message: String| format!("{} step: {}", step, message);
    match source {
        AppError::Pinning { message } => AppError::Pinning { message: tag(message) },
        AppError::Chain { message } => AppError::Chain { message: tag(message) },
        AppError::Render { message } => AppError::Render { message: tag(message) },
        AppError::Internal { message } => AppError::Internal { message: tag(message) },
        AppError::Orcid { message } => AppError::Orcid { message: tag(message) },
        other => other,
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;
