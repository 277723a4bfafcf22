//! Audit trail: structured catalog rows plus an append-only event log
//!
//! Auditing never raises into the processing path. Catalog-row writes and
//! event-log appends that fail are logged on the operational log and
//! swallowed; reconciliation is the safety net for anything lost.

use crate::catalog::{AttemptRecord, AuditPatch, CatalogStore, ReconciliationStats};
use crate::error::ArchiverResult;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use uuid::Uuid;

/// One self-describing audit event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum AuditEvent {
    #[serde(rename = "SYSTEM_STARTED")]
    SystemStarted {
        source_directory: String,
        archive_root: String,
        workers: usize,
    },
    #[serde(rename = "SYSTEM_STOPPED")]
    SystemStopped,
    #[serde(rename = "SYSTEM_ERROR")]
    SystemError { message: String },
    #[serde(rename = "FILE_DISCOVERED")]
    FileDiscovered { file: String, path: String },
    #[serde(rename = "FILE_QUARANTINED")]
    FileQuarantined { file: String, quarantine_path: String },
    #[serde(rename = "QUARANTINE_FAILED")]
    QuarantineFailed { file: String, error: String },
    #[serde(rename = "PROCESSING_ATTEMPT")]
    ProcessingAttempt {
        file: String,
        attempt: u32,
        max_attempts: u32,
    },
    #[serde(rename = "FILE_PROCESSED_SUCCESS")]
    FileProcessedSuccess {
        file: String,
        access_key: String,
        destination: String,
        attempts: u32,
        duration_ms: i64,
    },
    #[serde(rename = "FILE_DUPLICATE")]
    FileDuplicate {
        file: String,
        reason: String,
        preserved_path: Option<String>,
    },
    #[serde(rename = "FILE_DEAD_LETTER")]
    FileDeadLetter {
        file: String,
        attempts: u32,
        last_error: String,
        dead_letter_path: String,
    },
    #[serde(rename = "RECONCILIATION_COMPLETED")]
    ReconciliationCompleted {
        run_id: Uuid,
        files_checked: u32,
        issues_found: u32,
        issues_fixed: u32,
    },
}

/// Destination for audit events. Implementations must swallow their own
/// failures.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent);
}

/// Append-only JSONL event log: one object per line with `event`,
/// `timestamp` and the event payload
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn try_record(&self, event: &AuditEvent) -> ArchiverResult<()> {
        let mut value = serde_json::to_value(event)
            .map_err(|e| crate::error::ArchiverError::Other(e.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "timestamp".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        let mut line = value.to_string();
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.try_record(event).await {
            warn!("audit log append failed: {e}");
        }
    }
}

/// Facade over both audit surfaces: event sinks and the catalog's audit
/// rows, all wrapped in swallow-and-log semantics
pub struct AuditTrail {
    catalog: Arc<CatalogStore>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditTrail {
    pub fn new(catalog: Arc<CatalogStore>, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { catalog, sinks }
    }

    /// Emit an event to every sink
    pub async fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.record(&event).await;
        }
    }

    /// Open an audit row; `None` when the catalog write failed
    pub async fn open_audit(
        &self,
        content_hash: &str,
        filename: &str,
        original_path: &str,
    ) -> Option<i32> {
        match self
            .catalog
            .create_audit(content_hash, filename, original_path)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("failed to open audit row for {filename}: {e}");
                None
            }
        }
    }

    pub async fn update(&self, audit_id: Option<i32>, patch: AuditPatch) {
        let Some(id) = audit_id else { return };
        if let Err(e) = self.catalog.update_audit(id, patch).await {
            warn!("failed to update audit row {id}: {e}");
        }
    }

    pub async fn attempt(&self, record: AttemptRecord) {
        let audit_id = record.audit_id;
        if let Err(e) = self.catalog.record_attempt(record).await {
            warn!("failed to record attempt for audit row {audit_id}: {e}");
        }
    }

    pub async fn reconciliation(&self, stats: &ReconciliationStats) {
        if let Err(e) = self.catalog.record_reconciliation(stats).await {
            error!("failed to record reconciliation run: {e}");
        }
    }
}
