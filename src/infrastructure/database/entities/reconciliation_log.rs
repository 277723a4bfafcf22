//! Reconciliation run log entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reconciliation_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub run_at: DateTimeUtc,
    pub files_checked: i32,
    pub issues_found: i32,
    pub issues_fixed: i32,

    /// Human-readable summary of what the run saw and did
    pub details: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
