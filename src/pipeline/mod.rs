//! Per-file processing pipeline
//!
//! Drives one file through quarantine → parse → catalog insert → archive
//! move, with bounded retries, exponential backoff and a dead-letter
//! terminal. Every state transition lands in the audit trail.

pub mod cache;
pub mod mover;
mod transaction;

pub use cache::IdempotencyCache;
pub use mover::FileMover;

use crate::audit::{AuditEvent, AuditTrail};
use crate::catalog::{AttemptRecord, AuditPatch, CatalogStore};
use crate::domain::ProcessingStatus;
use crate::error::ArchiverResult;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use transaction::AttemptOutcome;

/// Terminal outcome of one file's journey
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// File archived and catalogued
    Archived,
    /// Another document already owns this content or key
    Duplicate,
    /// Retry budget exhausted, file parked in dead-letter
    DeadLettered,
    /// Never entered the retry loop; the next scan or reconciliation pass
    /// will see the file again
    Skipped,
}

/// What happened to one file, for batch accounting
#[derive(Debug, Clone, Copy)]
pub struct FileReport {
    pub outcome: FileOutcome,
    pub attempts: u32,
}

impl FileReport {
    fn skipped() -> Self {
        Self {
            outcome: FileOutcome::Skipped,
            attempts: 0,
        }
    }
}

/// Everything the retry loop needs to know about one quarantined file
struct FileContext {
    staged: PathBuf,
    original_name: String,
    content_hash: String,
    audit_id: Option<i32>,
}

/// The per-file state machine and retry controller
pub struct Pipeline {
    catalog: Arc<CatalogStore>,
    cache: Arc<IdempotencyCache>,
    mover: FileMover,
    audit: Arc<AuditTrail>,
    max_attempts: u32,
    retry_base: u64,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<CatalogStore>,
        cache: Arc<IdempotencyCache>,
        mover: FileMover,
        audit: Arc<AuditTrail>,
        max_attempts: u32,
        retry_base: u64,
    ) -> Self {
        Self {
            catalog,
            cache,
            mover,
            audit,
            max_attempts,
            retry_base,
        }
    }

    pub fn mover(&self) -> &FileMover {
        &self.mover
    }

    /// Process a freshly discovered inbox file end to end
    pub async fn process_file(&self, path: &Path) -> FileReport {
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.audit
            .emit(AuditEvent::FileDiscovered {
                file: original_name.clone(),
                path: path.display().to_string(),
            })
            .await;

        let staged = match self.mover.quarantine(path).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("failed to quarantine {}: {e}", path.display());
                self.audit
                    .emit(AuditEvent::QuarantineFailed {
                        file: original_name,
                        error: e.to_string(),
                    })
                    .await;
                return FileReport::skipped();
            }
        };

        let content_hash = match hash_file(&staged).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("failed to hash {}: {e}", staged.display());
                return FileReport::skipped();
            }
        };

        let audit_id = self
            .audit
            .open_audit(&content_hash, &original_name, &path.to_string_lossy())
            .await;
        self.audit
            .update(
                audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::Quarantined),
                    ..Default::default()
                },
            )
            .await;
        self.audit
            .emit(AuditEvent::FileQuarantined {
                file: original_name.clone(),
                quarantine_path: staged.display().to_string(),
            })
            .await;

        self.run_attempts(FileContext {
            staged,
            original_name,
            content_hash,
            audit_id,
        })
        .await
    }

    /// Re-enter the pipeline for a file already sitting in quarantine.
    /// Used by the reconciler for stranded files; reuses the file's open
    /// audit row when one exists, otherwise opens one.
    pub async fn process_quarantined(&self, staged: &Path) -> FileReport {
        let staged_name = staged
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| staged.display().to_string());
        let original_name = mover::original_filename(&staged_name).to_string();

        let content_hash = match hash_file(staged).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!("failed to hash {}: {e}", staged.display());
                return FileReport::skipped();
            }
        };

        let audit_id = match self.catalog.latest_audit_by_hash(&content_hash).await {
            Ok(Some(row)) => {
                let terminal = row
                    .current_status
                    .parse::<ProcessingStatus>()
                    .map(|s| s.is_terminal())
                    .unwrap_or(false);
                if terminal {
                    // The previous journey for these bytes already ended;
                    // this is a fresh (duplicate) feed
                    self.audit
                        .open_audit(&content_hash, &original_name, &staged.to_string_lossy())
                        .await
                } else {
                    Some(row.id)
                }
            }
            Ok(None) => {
                self.audit
                    .open_audit(&content_hash, &original_name, &staged.to_string_lossy())
                    .await
            }
            Err(e) => {
                warn!("audit lookup failed for {}: {e}", staged.display());
                None
            }
        };

        self.run_attempts(FileContext {
            staged: staged.to_path_buf(),
            original_name,
            content_hash,
            audit_id,
        })
        .await
    }

    /// Retry loop: at most `max_attempts` passes through the atomic
    /// transaction, sleeping `retry_base^k` seconds after attempt k
    async fn run_attempts(&self, ctx: FileContext) -> FileReport {
        let started = Instant::now();
        let mut last_error_text = String::new();

        for attempt in 1..=self.max_attempts {
            self.audit
                .update(
                    ctx.audit_id,
                    AuditPatch {
                        status: Some(ProcessingStatus::Processing),
                        attempt_count: Some(attempt as i32),
                        last_attempt_at: Some(chrono::Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
            self.audit
                .emit(AuditEvent::ProcessingAttempt {
                    file: ctx.original_name.clone(),
                    attempt,
                    max_attempts: self.max_attempts,
                })
                .await;

            let attempt_started = Instant::now();
            let outcome = self.atomic_process(&ctx).await;
            let attempt_ms = attempt_started.elapsed().as_millis() as i64;

            match outcome {
                AttemptOutcome::Archived {
                    destination,
                    issuer_id,
                    access_key,
                } => {
                    let total_ms = started.elapsed().as_millis() as i64;
                    self.cache.insert(&ctx.content_hash, &access_key);

                    if let Some(audit_id) = ctx.audit_id {
                        self.audit
                            .attempt(AttemptRecord {
                                audit_id,
                                attempt_number: attempt as i32,
                                status: ProcessingStatus::Success,
                                error_kind: None,
                                error_message: None,
                                stack_trace: None,
                                duration_ms: attempt_ms,
                            })
                            .await;
                    }
                    self.audit
                        .update(
                            ctx.audit_id,
                            AuditPatch {
                                status: Some(ProcessingStatus::Success),
                                access_key: Some(access_key.clone()),
                                issuer_id,
                                final_destination: Some(destination.display().to_string()),
                                completed_at: Some(chrono::Utc::now()),
                                total_duration_ms: Some(total_ms),
                                ..Default::default()
                            },
                        )
                        .await;
                    self.audit
                        .emit(AuditEvent::FileProcessedSuccess {
                            file: ctx.original_name.clone(),
                            access_key,
                            destination: destination.display().to_string(),
                            attempts: attempt,
                            duration_ms: total_ms,
                        })
                        .await;

                    info!(
                        "archived {} -> {} (attempt {attempt})",
                        ctx.original_name,
                        destination.display()
                    );
                    return FileReport {
                        outcome: FileOutcome::Archived,
                        attempts: attempt,
                    };
                }

                AttemptOutcome::Duplicate { reason, preserved } => {
                    if let Some(audit_id) = ctx.audit_id {
                        self.audit
                            .attempt(AttemptRecord {
                                audit_id,
                                attempt_number: attempt as i32,
                                status: ProcessingStatus::Duplicate,
                                error_kind: None,
                                error_message: Some(reason.to_string()),
                                stack_trace: None,
                                duration_ms: attempt_ms,
                            })
                            .await;
                    }
                    self.audit
                        .update(
                            ctx.audit_id,
                            AuditPatch {
                                status: Some(ProcessingStatus::Duplicate),
                                final_destination: preserved
                                    .as_ref()
                                    .map(|p| p.display().to_string()),
                                completed_at: Some(chrono::Utc::now()),
                                total_duration_ms: Some(started.elapsed().as_millis() as i64),
                                ..Default::default()
                            },
                        )
                        .await;
                    self.audit
                        .emit(AuditEvent::FileDuplicate {
                            file: ctx.original_name.clone(),
                            reason: reason.to_string(),
                            preserved_path: preserved.map(|p| p.display().to_string()),
                        })
                        .await;

                    debug!("duplicate {} ({reason})", ctx.original_name);
                    return FileReport {
                        outcome: FileOutcome::Duplicate,
                        attempts: attempt,
                    };
                }

                AttemptOutcome::Failed { status, error } => {
                    let kind = error.kind();
                    last_error_text = error.chain();
                    warn!(
                        "attempt {attempt}/{} failed for {}: {last_error_text}",
                        self.max_attempts, ctx.original_name
                    );

                    if let Some(audit_id) = ctx.audit_id {
                        self.audit
                            .attempt(AttemptRecord {
                                audit_id,
                                attempt_number: attempt as i32,
                                status,
                                error_kind: Some(kind),
                                error_message: Some(error.to_string()),
                                stack_trace: Some(last_error_text.clone()),
                                duration_ms: attempt_ms,
                            })
                            .await;
                    }
                    self.audit
                        .update(
                            ctx.audit_id,
                            AuditPatch {
                                status: Some(status),
                                last_error: Some((kind, error.to_string())),
                                ..Default::default()
                            },
                        )
                        .await;

                    if attempt < self.max_attempts {
                        let delay = self.retry_base.saturating_pow(attempt);
                        debug!("backing off {delay}s before attempt {}", attempt + 1);
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        self.dead_letter(&ctx, started, &last_error_text).await
    }

    /// Budget exhausted: park the file and close the audit row
    async fn dead_letter(
        &self,
        ctx: &FileContext,
        started: Instant,
        last_error: &str,
    ) -> FileReport {
        let dead_path = match self.mover.to_dead_letter(&ctx.staged).await {
            Ok(path) => path.display().to_string(),
            Err(e) => {
                // The file stays in quarantine; reconciliation will retry it
                warn!(
                    "failed to dead-letter {}: {e}; leaving in quarantine",
                    ctx.staged.display()
                );
                ctx.staged.display().to_string()
            }
        };

        self.audit
            .update(
                ctx.audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::FailedPermanent),
                    final_destination: Some(dead_path.clone()),
                    completed_at: Some(chrono::Utc::now()),
                    total_duration_ms: Some(started.elapsed().as_millis() as i64),
                    ..Default::default()
                },
            )
            .await;
        self.audit
            .emit(AuditEvent::FileDeadLetter {
                file: ctx.original_name.clone(),
                attempts: self.max_attempts,
                last_error: last_error.to_string(),
                dead_letter_path: dead_path,
            })
            .await;

        warn!(
            "dead-lettered {} after {} attempts",
            ctx.original_name, self.max_attempts
        );
        FileReport {
            outcome: FileOutcome::DeadLettered,
            attempts: self.max_attempts,
        }
    }
}

/// Lowercase hex SHA-256 of the file bytes
pub async fn hash_file(path: &Path) -> ArchiverResult<String> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hashing_is_stable_and_content_addressed() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.xml");
        let b = tmp.path().join("b.xml");
        tokio::fs::write(&a, b"<nfe/>").await.unwrap();
        tokio::fs::write(&b, b"<nfe/>").await.unwrap();

        let hash_a = hash_file(&a).await.unwrap();
        let hash_b = hash_file(&b).await.unwrap();
        assert_eq!(hash_a, hash_b);
        assert_eq!(hash_a.len(), 64);

        tokio::fs::write(&b, b"<nfe versao=\"4.00\"/>").await.unwrap();
        assert_ne!(hash_a, hash_file(&b).await.unwrap());
    }
}
