//! Per-attempt audit entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processing_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub audit_id: i32,

    pub attempt_number: i32,
    pub status: String,

    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    /// Full error chain rendering, truncated to 2000 chars
    pub stack_trace: Option<String>,

    pub duration_ms: i64,
    pub attempted_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::processing_audit::Entity",
        from = "Column::AuditId",
        to = "super::processing_audit::Column::Id"
    )]
    ProcessingAudit,
}

impl Related<super::processing_audit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessingAudit.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
