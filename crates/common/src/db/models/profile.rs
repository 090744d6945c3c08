//! Principal profile with optional verified ORCID identity

use crate::auth::VerifiedIdentity;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    /// Matches the session principal id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", nullable, unique)]
    pub wallet_address: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub orcid_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub orcid_name: Option<String>,

    pub orcid_verified: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// The verified identity, if ORCID verification completed
    pub fn verified_identity(&self) -> Option<VerifiedIdentity> {
        match (&self.orcid_id, self.orcid_verified) {
            (Some(orcid_id), true) => Some(VerifiedIdentity {
                orcid_id: orcid_id.clone(),
                display_name: self.orcid_name.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
