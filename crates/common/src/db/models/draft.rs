//! Draft entity for in-progress compositions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "article_drafts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub author_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// `{ "html": ... }`
    #[sea_orm(column_type = "JsonBinary")]
    pub content: serde_json::Value,

    /// Abstract, keywords, publication type, license, network
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub last_saved_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
