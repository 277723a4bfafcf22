//! The atomic catalog-insert + file-move transaction
//!
//! Ordering: duplicate short-circuits, extract, issuer upsert, destination
//! check, document insert, archive move. A move failure deletes the row it
//! just inserted; a rollback failure is logged as critical and swallowed —
//! reconciliation is the safety net for what it leaves behind.

use super::{FileContext, Pipeline};
use crate::audit::AuditEvent;
use crate::catalog::{AuditPatch, InsertOutcome, NewDocument};
use crate::domain::{canonical_issuer_name, ProcessingStatus};
use crate::error::ArchiverError;
use crate::extractor;
use std::fmt;
use std::path::PathBuf;
use tracing::error;

/// Result of one pass through the transaction
pub(super) enum AttemptOutcome {
    Archived {
        destination: PathBuf,
        issuer_id: Option<i32>,
        access_key: String,
    },
    Duplicate {
        reason: DuplicateReason,
        preserved: Option<PathBuf>,
    },
    Failed {
        status: ProcessingStatus,
        error: ArchiverError,
    },
}

/// How a duplicate was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DuplicateReason {
    ContentHash,
    AccessKey,
    DestinationExists,
    UniqueConstraint,
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DuplicateReason::ContentHash => "content hash already processed",
            DuplicateReason::AccessKey => "access key already processed",
            DuplicateReason::DestinationExists => "destination file already exists",
            DuplicateReason::UniqueConstraint => "catalog uniqueness constraint",
        };
        f.write_str(text)
    }
}

impl Pipeline {
    pub(super) async fn atomic_process(&self, ctx: &FileContext) -> AttemptOutcome {
        // Known content hash: short-circuit before parsing
        if self.cache.contains_hash(&ctx.content_hash) {
            if let Some(outcome) = self
                .resolve_duplicate(ctx, DuplicateReason::ContentHash, None)
                .await
            {
                return outcome;
            }
        }

        let record = match extractor::extract_from_path(&ctx.staged).await {
            Ok(record) => record,
            Err(error) => {
                return AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedParsing,
                    error,
                }
            }
        };
        self.audit
            .update(
                ctx.audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::Parsed),
                    access_key: Some(record.access_key.clone()),
                    ..Default::default()
                },
            )
            .await;

        // Known access key
        if self.cache.contains_access_key(&record.access_key) {
            if let Some(outcome) = self
                .resolve_duplicate(ctx, DuplicateReason::AccessKey, Some(&record.access_key))
                .await
            {
                return outcome;
            }
        }

        // Issuer table is idempotent by tax id, so this sits outside the
        // document insert
        let canonical_name = canonical_issuer_name(&record.issuer_name);
        let issuer_id = match self
            .catalog
            .upsert_issuer(&record.tax_id, &canonical_name)
            .await
        {
            Ok(id) => id,
            Err(error) => {
                return AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedDb,
                    error,
                }
            }
        };

        let destination = self
            .mover
            .archive_destination(&record, &canonical_name, &ctx.original_name);

        match tokio::fs::try_exists(&destination).await {
            Ok(true) => {
                // A file is already archived there; keep ours visible to the
                // operator instead of silently dropping it
                return match self.mover.to_duplicates(&ctx.staged).await {
                    Ok(preserved) => AttemptOutcome::Duplicate {
                        reason: DuplicateReason::DestinationExists,
                        preserved: Some(preserved),
                    },
                    Err(error) => AttemptOutcome::Failed {
                        status: ProcessingStatus::FailedMove,
                        error,
                    },
                };
            }
            Ok(false) => {}
            Err(error) => {
                return AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedMove,
                    error: error.into(),
                }
            }
        }

        match self
            .catalog
            .insert_document(NewDocument {
                access_key: record.access_key.clone(),
                content_hash: ctx.content_hash.clone(),
                issuer_id,
                processed_date: record.processed_date,
                emission_date: record.emission_date,
                kind: record.kind.to_string(),
                final_destination: destination.display().to_string(),
            })
            .await
        {
            Ok(InsertOutcome::Inserted(_)) => {}
            Ok(InsertOutcome::Duplicate) => {
                return match self
                    .resolve_duplicate(
                        ctx,
                        DuplicateReason::UniqueConstraint,
                        Some(&record.access_key),
                    )
                    .await
                {
                    Some(outcome) => outcome,
                    // The constraint fired but the owning row is gone again;
                    // retry rather than guess
                    None => AttemptOutcome::Failed {
                        status: ProcessingStatus::FailedDb,
                        error: ArchiverError::Integrity(
                            "duplicate reported but no owning document row found".to_string(),
                        ),
                    },
                };
            }
            Err(error) => {
                return AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedDb,
                    error,
                }
            }
        }
        self.audit
            .update(
                ctx.audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::DbInserted),
                    issuer_id: Some(issuer_id),
                    ..Default::default()
                },
            )
            .await;

        // The move is the commit point of the filesystem half; if it fails
        // the row above must not survive
        if let Err(move_error) = self.mover.move_file(&ctx.staged, &destination).await {
            if let Err(rollback_error) = self.catalog.delete_document(&record.access_key).await {
                error!(
                    "CRITICAL: rollback of document {} failed after move error ({move_error}): \
                     {rollback_error}",
                    record.access_key
                );
                self.audit
                    .emit(AuditEvent::SystemError {
                        message: format!(
                            "rollback failed for access key {}: {rollback_error}",
                            record.access_key
                        ),
                    })
                    .await;
            }
            return AttemptOutcome::Failed {
                status: ProcessingStatus::FailedMove,
                error: move_error,
            };
        }
        self.audit
            .update(
                ctx.audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::FileMoved),
                    ..Default::default()
                },
            )
            .await;

        AttemptOutcome::Archived {
            destination,
            issuer_id: Some(issuer_id),
            access_key: record.access_key,
        }
    }

    /// Decide what a detected duplicate really is.
    ///
    /// Returns `None` when no document row owns this content or key after
    /// all — the caches are advisory, the catalog is the source of truth —
    /// in which case processing continues. When the owning row's file never
    /// made it to the archive (crash between insert and move) and our bytes
    /// match, the interrupted move is completed instead of discarding them.
    async fn resolve_duplicate(
        &self,
        ctx: &FileContext,
        reason: DuplicateReason,
        access_key: Option<&str>,
    ) -> Option<AttemptOutcome> {
        let by_hash = match self.catalog.document_by_hash(&ctx.content_hash).await {
            Ok(row) => row,
            Err(error) => {
                return Some(AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedDb,
                    error,
                })
            }
        };

        let row = match by_hash {
            Some(row) => Some(row),
            None => match access_key {
                Some(key) => match self.catalog.document_by_access_key(key).await {
                    Ok(row) => row,
                    Err(error) => {
                        return Some(AttemptOutcome::Failed {
                            status: ProcessingStatus::FailedDb,
                            error,
                        })
                    }
                },
                None => None,
            },
        };

        let row = row?;

        let destination = PathBuf::from(&row.final_destination);
        let destination_present = tokio::fs::try_exists(&destination).await.unwrap_or(false);

        if !destination_present && row.content_hash == ctx.content_hash {
            return Some(match self.mover.move_file(&ctx.staged, &destination).await {
                Ok(()) => AttemptOutcome::Archived {
                    destination,
                    issuer_id: Some(row.issuer_id),
                    access_key: row.access_key,
                },
                Err(error) => AttemptOutcome::Failed {
                    status: ProcessingStatus::FailedMove,
                    error,
                },
            });
        }

        match tokio::fs::remove_file(&ctx.staged).await {
            Ok(()) => Some(AttemptOutcome::Duplicate {
                reason,
                preserved: None,
            }),
            Err(error) => Some(AttemptOutcome::Failed {
                status: ProcessingStatus::FailedMove,
                error: error.into(),
            }),
        }
    }
}
