//! Periodic reconciliation sweep
//!
//! Recovers what the pipeline left behind: stale quarantine files get
//! re-fed through the full single-file pipeline, audit rows stuck in an
//! intermediate status with no file anywhere are closed out, and the
//! dead-letter backlog is counted for the operator.

use crate::audit::{AuditEvent, AuditTrail};
use crate::catalog::{AuditPatch, CatalogStore, ReconciliationStats};
use crate::domain::ProcessingStatus;
use crate::error::ErrorKind;
use crate::pipeline::{FileOutcome, Pipeline};
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Quarantine entries younger than this are considered in flight
const STALE_QUARANTINE_AFTER: Duration = Duration::from_secs(300);
/// Audit rows without progress for this long are considered stuck
const STUCK_AUDIT_AFTER_MINUTES: i64 = 10;

pub struct Reconciler {
    catalog: Arc<CatalogStore>,
    pipeline: Arc<Pipeline>,
    audit: Arc<AuditTrail>,
    stale_after: Duration,
    stuck_after: chrono::Duration,
}

impl Reconciler {
    pub fn new(catalog: Arc<CatalogStore>, pipeline: Arc<Pipeline>, audit: Arc<AuditTrail>) -> Self {
        Self {
            catalog,
            pipeline,
            audit,
            stale_after: STALE_QUARANTINE_AFTER,
            stuck_after: chrono::Duration::minutes(STUCK_AUDIT_AFTER_MINUTES),
        }
    }

    /// Override the staleness thresholds, e.g. for a backlog drain
    pub fn with_thresholds(mut self, stale_after: Duration, stuck_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self.stuck_after = stuck_after;
        self
    }

    /// One full reconciliation pass
    pub async fn run(&self) -> ReconciliationStats {
        let run_id = Uuid::new_v4();
        let mut stats = ReconciliationStats::default();
        let mut details = String::new();

        self.sweep_quarantine(&mut stats, &mut details).await;
        self.resolve_stuck_audits(&mut stats, &mut details).await;
        self.census_dead_letter(&mut details).await;

        stats.details = details.trim_end().to_string();

        self.audit.reconciliation(&stats).await;
        self.audit
            .emit(AuditEvent::ReconciliationCompleted {
                run_id,
                files_checked: stats.files_checked,
                issues_found: stats.issues_found,
                issues_fixed: stats.issues_fixed,
            })
            .await;

        info!(
            "reconciliation {run_id}: checked {} found {} fixed {}",
            stats.files_checked, stats.issues_found, stats.issues_fixed
        );
        stats
    }

    /// Re-feed quarantine files that have sat untouched past the staleness
    /// threshold through the full pipeline
    async fn sweep_quarantine(&self, stats: &mut ReconciliationStats, details: &mut String) {
        let quarantine = self.pipeline.mover().quarantine_dir().to_path_buf();
        let mut entries = match tokio::fs::read_dir(&quarantine).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot list quarantine {}: {e}", quarantine.display());
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("quarantine listing aborted: {e}");
                    break;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            stats.files_checked += 1;

            let age = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.elapsed().ok());
            let Some(age) = age else { continue };
            if age < self.stale_after {
                continue;
            }

            stats.issues_found += 1;
            info!("reconciling stale quarantine file {}", path.display());
            let report = self.pipeline.process_quarantined(&path).await;
            match report.outcome {
                FileOutcome::Archived | FileOutcome::Duplicate => {
                    stats.issues_fixed += 1;
                    let _ = writeln!(
                        details,
                        "recovered stale quarantine file {} ({:?})",
                        path.display(),
                        report.outcome
                    );
                }
                FileOutcome::DeadLettered | FileOutcome::Skipped => {
                    let _ = writeln!(
                        details,
                        "stale quarantine file {} not recovered ({:?})",
                        path.display(),
                        report.outcome
                    );
                }
            }
        }
    }

    /// Close audit rows stuck in an intermediate status whose file is gone
    /// from every staging area
    async fn resolve_stuck_audits(&self, stats: &mut ReconciliationStats, details: &mut String) {
        let cutoff = Utc::now() - self.stuck_after;
        let stuck = match self
            .catalog
            .find_stuck_audits(cutoff, &ProcessingStatus::INTERMEDIATE)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("stuck-audit query failed: {e}");
                return;
            }
        };

        for row in stuck {
            stats.files_checked += 1;

            let staged = match self.pipeline.mover().find_staged_file(&row.filename).await {
                Ok(staged) => staged,
                Err(e) => {
                    warn!("staging search failed for {}: {e}", row.filename);
                    continue;
                }
            };

            if staged.is_some() {
                // Still on disk; the quarantine sweep owns its recovery
                continue;
            }

            stats.issues_found += 1;
            self.audit
                .update(
                    Some(row.id),
                    AuditPatch {
                        status: Some(ProcessingStatus::FailedPermanent),
                        last_error: Some((
                            ErrorKind::FileNotFound,
                            "file lost during reconciliation".to_string(),
                        )),
                        completed_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
            stats.issues_fixed += 1;
            let _ = writeln!(
                details,
                "audit {} ({}) marked FAILED_PERMANENT: file lost",
                row.id, row.filename
            );
            warn!(
                "audit {} stuck in {} and file {} gone; marked permanent failure",
                row.id, row.current_status, row.filename
            );
        }
    }

    /// Observational only: how deep is the operator's investigation queue
    async fn census_dead_letter(&self, details: &mut String) {
        let dead_dir = self.pipeline.mover().dead_letter_dir();
        let mut count = 0usize;
        if let Ok(mut entries) = tokio::fs::read_dir(dead_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.path().is_file() {
                    count += 1;
                }
            }
        }
        if count > 0 {
            warn!("{count} file(s) in dead letter awaiting investigation");
        }
        let _ = writeln!(details, "dead letter backlog: {count}");
    }
}
