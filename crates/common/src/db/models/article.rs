//! Article entity

use crate::types::{Network, PublicationType};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "articles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Principal that created the article
    pub author_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub abstract_text: String,

    pub keywords: Vec<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub license: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub publication_type: String,

    /// Primary content (article payload JSON)
    #[sea_orm(column_type = "Text", nullable)]
    pub ipfs_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub ipfs_gateway_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_ipfs_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub pdf_gateway_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cover_image_ipfs: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub ipa_metadata_uri: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub ipa_metadata_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub nft_metadata_uri: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub nft_metadata_hash: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub network: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub ip_asset_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub transaction_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub spg_contract_address: Option<String>,

    pub minted_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    /// User-linked external DOI
    #[sea_orm(column_type = "Text", nullable)]
    pub zenodo_doi: Option<String>,

    /// Owner; null means unclaimed. Stored lower-cased.
    #[sea_orm(column_type = "Text", nullable)]
    pub wallet_address: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn network(&self) -> Network {
        self.network.parse().unwrap_or_default()
    }

    pub fn publication_type(&self) -> PublicationType {
        self.publication_type.parse().unwrap_or_default()
    }

    pub fn is_claimed(&self) -> bool {
        self.wallet_address.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::article_author::Entity")]
    Authors,
}

impl Related<super::article_author::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Authors.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
