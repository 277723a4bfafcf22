//! Per-file processing audit entity
//!
//! One row per discovered file, keyed by content hash at discovery time.
//! The hash is deliberately not unique: a re-feed of identical bytes opens
//! a fresh audit row that terminates as a duplicate.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processing_audit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub content_hash: String,

    pub filename: String,
    pub original_path: String,
    pub discovered_at: DateTimeUtc,

    #[sea_orm(indexed)]
    pub current_status: String,

    pub attempt_count: i32,

    #[sea_orm(indexed)]
    pub last_attempt_at: Option<DateTimeUtc>,

    pub last_error_kind: Option<String>,
    /// Truncated to 500 chars
    pub last_error_message: Option<String>,

    pub final_destination: Option<String>,
    pub access_key: Option<String>,
    pub issuer_id: Option<i32>,

    pub completed_at: Option<DateTimeUtc>,
    pub total_duration_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::processing_attempt::Entity")]
    ProcessingAttempt,
}

impl Related<super::processing_attempt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessingAttempt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
