//! Processed document entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// 44-character access key, unique per document
    #[sea_orm(unique)]
    pub access_key: String,

    /// Lowercase hex SHA-256 of the file bytes, unique per document
    #[sea_orm(unique)]
    pub content_hash: String,

    pub issuer_id: i32,

    pub processed_date: Date,
    pub emission_date: Date,

    /// NFE, NFCE or MOD<code>
    pub kind: String,

    /// Absolute path of the archived file
    pub final_destination: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::issuer::Entity",
        from = "Column::IssuerId",
        to = "super::issuer::Column::Id"
    )]
    Issuer,
}

impl Related<super::issuer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issuer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
