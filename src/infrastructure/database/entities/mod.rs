//! SeaORM entity definitions
//!
//! These map the catalog and audit tables to database rows.

pub mod document;
pub mod issuer;
pub mod processing_attempt;
pub mod processing_audit;
pub mod reconciliation_log;

// Re-export all entities
pub use document::Entity as Document;
pub use issuer::Entity as Issuer;
pub use processing_attempt::Entity as ProcessingAttempt;
pub use processing_audit::Entity as ProcessingAudit;
pub use reconciliation_log::Entity as ReconciliationLog;

// Re-export active models for easy access
pub use document::ActiveModel as DocumentActive;
pub use issuer::ActiveModel as IssuerActive;
pub use processing_attempt::ActiveModel as ProcessingAttemptActive;
pub use processing_audit::ActiveModel as ProcessingAuditActive;
pub use reconciliation_log::ActiveModel as ReconciliationLogActive;
