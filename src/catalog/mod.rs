//! Typed catalog operations over the database entities
//!
//! All writes are serialized behind a store-owned lock; duplicate detection
//! happens here, at the uniqueness constraints, and is reported as a value
//! rather than an error.

use crate::domain::ProcessingStatus;
use crate::error::{truncate_message, ArchiverError, ArchiverResult, ErrorKind};
use crate::infrastructure::database::{entities, Database};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, SqlErr,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maximum stored length of an error message
const ERROR_MESSAGE_MAX: usize = 500;
/// Maximum stored length of an error chain rendering
const STACK_TRACE_MAX: usize = 2000;

/// Outcome of a document insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row committed, id returned
    Inserted(i32),
    /// A document with this access key or content hash already exists
    Duplicate,
}

/// Fields of a new document row
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub access_key: String,
    pub content_hash: String,
    pub issuer_id: i32,
    pub processed_date: NaiveDate,
    pub emission_date: NaiveDate,
    pub kind: String,
    pub final_destination: String,
}

/// Partial update of an audit row
#[derive(Debug, Default)]
pub struct AuditPatch {
    pub status: Option<ProcessingStatus>,
    pub attempt_count: Option<i32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<(ErrorKind, String)>,
    pub final_destination: Option<String>,
    pub access_key: Option<String>,
    pub issuer_id: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
}

/// One retry inside an audit row
#[derive(Debug)]
pub struct AttemptRecord {
    pub audit_id: i32,
    pub attempt_number: i32,
    pub status: ProcessingStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub duration_ms: i64,
}

/// Counters of one reconciliation run
#[derive(Debug, Clone, Default)]
pub struct ReconciliationStats {
    pub files_checked: u32,
    pub issues_found: u32,
    pub issues_fixed: u32,
    pub details: String,
}

/// Catalog store: issuers, documents and the audit tables
pub struct CatalogStore {
    db: Arc<Database>,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    pub fn conn(&self) -> &sea_orm::DatabaseConnection {
        self.db.conn()
    }

    /// Insert the issuer on first sight, or refresh its display name when a
    /// later document spells it differently. Returns the issuer id.
    pub async fn upsert_issuer(&self, tax_id: &str, name: &str) -> ArchiverResult<i32> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        if let Some(existing) = entities::Issuer::find()
            .filter(entities::issuer::Column::TaxId.eq(tax_id))
            .one(self.conn())
            .await?
        {
            if existing.name != name {
                let patch = entities::IssuerActive {
                    id: Set(existing.id),
                    name: Set(name.to_string()),
                    updated_at: Set(now),
                    ..Default::default()
                };
                patch.update(self.conn()).await?;
            }
            return Ok(existing.id);
        }

        let inserted = entities::IssuerActive {
            tax_id: Set(tax_id.to_string()),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;

        Ok(inserted.id)
    }

    /// Insert a document row. A unique-constraint violation on either the
    /// access key or the content hash reports `Duplicate`; every other
    /// database failure stays an error.
    pub async fn insert_document(&self, doc: NewDocument) -> ArchiverResult<InsertOutcome> {
        let _guard = self.write_lock.lock().await;

        let result = entities::DocumentActive {
            access_key: Set(doc.access_key),
            content_hash: Set(doc.content_hash),
            issuer_id: Set(doc.issuer_id),
            processed_date: Set(doc.processed_date),
            emission_date: Set(doc.emission_date),
            kind: Set(doc.kind),
            final_destination: Set(doc.final_destination),
            ..Default::default()
        }
        .insert(self.conn())
        .await;

        match result {
            Ok(model) => Ok(InsertOutcome::Inserted(model.id)),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(InsertOutcome::Duplicate),
                _ => Err(ArchiverError::Database(e)),
            },
        }
    }

    /// Remove a document row. Used only to roll back an insert whose file
    /// move failed.
    pub async fn delete_document(&self, access_key: &str) -> ArchiverResult<u64> {
        let _guard = self.write_lock.lock().await;
        let result = entities::Document::delete_many()
            .filter(entities::document::Column::AccessKey.eq(access_key))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn document_by_access_key(
        &self,
        access_key: &str,
    ) -> ArchiverResult<Option<entities::document::Model>> {
        entities::Document::find()
            .filter(entities::document::Column::AccessKey.eq(access_key))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn document_by_hash(
        &self,
        content_hash: &str,
    ) -> ArchiverResult<Option<entities::document::Model>> {
        entities::Document::find()
            .filter(entities::document::Column::ContentHash.eq(content_hash))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Open an audit row for a freshly discovered file
    pub async fn create_audit(
        &self,
        content_hash: &str,
        filename: &str,
        original_path: &str,
    ) -> ArchiverResult<i32> {
        let _guard = self.write_lock.lock().await;
        let inserted = entities::ProcessingAuditActive {
            content_hash: Set(content_hash.to_string()),
            filename: Set(filename.to_string()),
            original_path: Set(original_path.to_string()),
            discovered_at: Set(Utc::now()),
            current_status: Set(ProcessingStatus::Pending.to_string()),
            attempt_count: Set(0),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;
        Ok(inserted.id)
    }

    pub async fn update_audit(&self, audit_id: i32, patch: AuditPatch) -> ArchiverResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut row = entities::ProcessingAuditActive {
            id: Set(audit_id),
            ..Default::default()
        };

        if let Some(status) = patch.status {
            row.current_status = Set(status.to_string());
        }
        if let Some(count) = patch.attempt_count {
            row.attempt_count = Set(count);
        }
        if let Some(at) = patch.last_attempt_at {
            row.last_attempt_at = Set(Some(at));
        }
        if let Some((kind, message)) = patch.last_error {
            row.last_error_kind = Set(Some(kind.to_string()));
            row.last_error_message = Set(Some(truncate_message(&message, ERROR_MESSAGE_MAX)));
        }
        if let Some(dest) = patch.final_destination {
            row.final_destination = Set(Some(dest));
        }
        if let Some(key) = patch.access_key {
            row.access_key = Set(Some(key));
        }
        if let Some(issuer_id) = patch.issuer_id {
            row.issuer_id = Set(Some(issuer_id));
        }
        if let Some(at) = patch.completed_at {
            row.completed_at = Set(Some(at));
        }
        if let Some(ms) = patch.total_duration_ms {
            row.total_duration_ms = Set(Some(ms));
        }

        row.update(self.conn()).await?;
        Ok(())
    }

    pub async fn record_attempt(&self, attempt: AttemptRecord) -> ArchiverResult<()> {
        let _guard = self.write_lock.lock().await;
        entities::ProcessingAttemptActive {
            audit_id: Set(attempt.audit_id),
            attempt_number: Set(attempt.attempt_number),
            status: Set(attempt.status.to_string()),
            error_kind: Set(attempt.error_kind.map(|k| k.to_string())),
            error_message: Set(attempt
                .error_message
                .map(|m| truncate_message(&m, ERROR_MESSAGE_MAX))),
            stack_trace: Set(attempt
                .stack_trace
                .map(|t| truncate_message(&t, STACK_TRACE_MAX))),
            duration_ms: Set(attempt.duration_ms),
            attempted_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;
        Ok(())
    }

    pub async fn audit_by_id(
        &self,
        audit_id: i32,
    ) -> ArchiverResult<Option<entities::processing_audit::Model>> {
        entities::ProcessingAudit::find_by_id(audit_id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Most recent audit row for a content hash, if any
    pub async fn latest_audit_by_hash(
        &self,
        content_hash: &str,
    ) -> ArchiverResult<Option<entities::processing_audit::Model>> {
        entities::ProcessingAudit::find()
            .filter(entities::processing_audit::Column::ContentHash.eq(content_hash))
            .order_by_desc(entities::processing_audit::Column::Id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Audit rows sitting in one of the given statuses with no attempt (or
    /// discovery) newer than `older_than`
    pub async fn find_stuck_audits(
        &self,
        older_than: DateTime<Utc>,
        statuses: &[ProcessingStatus],
    ) -> ArchiverResult<Vec<entities::processing_audit::Model>> {
        use crate::infrastructure::database::entities::processing_audit::Column;

        let status_strings: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        entities::ProcessingAudit::find()
            .filter(
                Condition::all()
                    .add(Column::CurrentStatus.is_in(status_strings))
                    .add(
                        Condition::any()
                            .add(Column::LastAttemptAt.lt(older_than))
                            .add(
                                Condition::all()
                                    .add(Column::LastAttemptAt.is_null())
                                    .add(Column::DiscoveredAt.lt(older_than)),
                            ),
                    ),
            )
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn record_reconciliation(&self, stats: &ReconciliationStats) -> ArchiverResult<()> {
        let _guard = self.write_lock.lock().await;
        entities::ReconciliationLogActive {
            run_at: Set(Utc::now()),
            files_checked: Set(stats.files_checked as i32),
            issues_found: Set(stats.issues_found as i32),
            issues_fixed: Set(stats.issues_fixed as i32),
            details: Set(stats.details.clone()),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;
        Ok(())
    }

    /// Content hashes and access keys of every processed document, for
    /// idempotency-cache hydration at startup
    pub async fn load_processed_sets(&self) -> ArchiverResult<(HashSet<String>, HashSet<String>)> {
        let rows: Vec<(String, String)> = entities::Document::find()
            .select_only()
            .column(entities::document::Column::ContentHash)
            .column(entities::document::Column::AccessKey)
            .into_tuple()
            .all(self.conn())
            .await?;

        let mut hashes = HashSet::with_capacity(rows.len());
        let mut keys = HashSet::with_capacity(rows.len());
        for (hash, key) in rows {
            hashes.insert(hash);
            keys.insert(key);
        }
        Ok((hashes, keys))
    }
}
