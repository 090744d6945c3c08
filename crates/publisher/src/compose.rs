//! Composition fields and their validation
//!
//! A draft is stored as `{ title, content: { html }, metadata: { abstract,
//! keywords, publicationType, license, network } }`.

use scholarmint_common::db::models::Draft;
use scholarmint_common::db::DraftUpsert;
use scholarmint_common::errors::{AppError, Result};
use scholarmint_common::types::{Network, PublicationType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Author name used when the profile has none
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// Editable fields of an article in progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeInput {
    #[serde(default)]
    pub title: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    /// Rich-text body as HTML
    #[serde(default)]
    pub content_html: String,

    /// Comma-separated keywords as typed
    #[serde(default)]
    pub keywords: String,

    #[serde(default)]
    pub publication_type: PublicationType,

    #[serde(default)]
    pub license: Option<String>,

    #[serde(default)]
    pub network: Network,
}

/// Compose fields after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCompose {
    pub title: String,
    pub abstract_text: String,
    pub content_html: String,
    pub keywords: Vec<String>,
    pub publication_type: PublicationType,
    pub license: String,
    pub network: Network,
}

/// Split on commas, trim, drop empties
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl ComposeInput {
    /// Whether auto-save has anything worth writing
    pub fn is_saveable(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.abstract_text.trim().is_empty()
            && !self.content_html.trim().is_empty()
    }

    pub fn keyword_list(&self) -> Vec<String> {
        parse_keywords(&self.keywords)
    }

    /// Require title, abstract and content; apply the default license
    pub fn validate(&self, default_license: &str) -> Result<ValidatedCompose> {
        for (field, value) in [
            ("title", &self.title),
            ("abstract", &self.abstract_text),
            ("content", &self.content_html),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        let license = self
            .license
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(default_license)
            .to_string();

        Ok(ValidatedCompose {
            title: self.title.trim().to_string(),
            abstract_text: self.abstract_text.trim().to_string(),
            content_html: self.content_html.clone(),
            keywords: self.keyword_list(),
            publication_type: self.publication_type,
            license,
            network: self.network,
        })
    }

    /// Row written by auto-save
    pub fn to_draft(&self, draft_id: Uuid, author_id: Uuid) -> DraftUpsert {
        DraftUpsert {
            id: draft_id,
            author_id,
            title: self.title.clone(),
            content: json!({ "html": self.content_html }),
            metadata: json!({
                "abstract": self.abstract_text,
                "keywords": self.keywords,
                "publicationType": self.publication_type,
                "license": self.license,
                "network": self.network,
            }),
        }
    }

    /// Restore compose fields from a stored draft
    pub fn from_draft(draft: &Draft) -> Self {
        let meta = &draft.metadata;
        let text = |key: &str| meta.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Self {
            title: draft.title.clone(),
            abstract_text: text("abstract").unwrap_or_default(),
            content_html: draft
                .content
                .get("html")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            keywords: text("keywords").unwrap_or_default(),
            publication_type: text("publicationType")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            license: text("license"),
            network: text("network").and_then(|v| v.parse().ok()).unwrap_or_default(),
        }
    }
}
