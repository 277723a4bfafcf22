//! Top-level processing loop
//!
//! Scan the inbox, split candidates into batches, run each batch through a
//! bounded worker pool, reconcile on its own cadence, and sleep between
//! scans. Shutdown finishes the in-flight batch, then exits.

use crate::config::Settings;
use crate::error::ArchiverResult;
use crate::pipeline::{FileOutcome, FileReport, Pipeline};
use crate::reconciler::Reconciler;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Per-batch counters surfaced on the operational log
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub success: usize,
    pub duplicate: usize,
    pub error: usize,
    pub total_attempts: u32,
}

impl BatchStats {
    fn absorb(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Archived => self.success += 1,
            FileOutcome::Duplicate => self.duplicate += 1,
            FileOutcome::DeadLettered | FileOutcome::Skipped => self.error += 1,
        }
        self.total_attempts += report.attempts;
    }
}

pub struct Orchestrator {
    settings: Settings,
    pipeline: Arc<Pipeline>,
    reconciler: Reconciler,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        pipeline: Arc<Pipeline>,
        reconciler: Reconciler,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            pipeline,
            reconciler,
            shutdown,
        }
    }

    /// Run until shutdown is requested
    pub async fn run(&mut self) -> ArchiverResult<()> {
        let mut last_reconciliation = Instant::now();

        while !*self.shutdown.borrow() {
            match scan_inbox(&self.settings.source_directory).await {
                Ok(candidates) if candidates.is_empty() => {
                    debug!("inbox empty");
                }
                Ok(candidates) => {
                    info!("found {} candidate file(s)", candidates.len());
                    for batch in candidates.chunks(self.settings.batch_size) {
                        if *self.shutdown.borrow() {
                            break;
                        }
                        let stats = self.process_batch(batch).await;
                        info!(
                            "batch done: success={} duplicate={} error={} total_attempts={}",
                            stats.success, stats.duplicate, stats.error, stats.total_attempts
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "inbox scan of {} failed: {e}",
                        self.settings.source_directory.display()
                    );
                }
            }

            if last_reconciliation.elapsed() >= self.settings.reconciliation_interval() {
                self.reconciler.run().await;
                last_reconciliation = Instant::now();
            }

            // Sleep the scan interval, but wake immediately on shutdown
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.settings.scan_interval()) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("orchestrator stopping");
        Ok(())
    }

    /// Process one batch with at most `max_workers` files in flight
    pub async fn process_batch(&self, files: &[PathBuf]) -> BatchStats {
        let mut stats = BatchStats::default();
        let deadline = self.settings.file_deadline();

        for chunk in files.chunks(self.settings.max_workers) {
            let tasks: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|path| {
                    let pipeline = self.pipeline.clone();
                    tokio::spawn(async move {
                        match tokio::time::timeout(deadline, pipeline.process_file(&path)).await {
                            Ok(report) => report,
                            Err(_) => {
                                // The file stays in quarantine; reconciliation
                                // picks it up on a later pass
                                warn!("processing {} timed out", path.display());
                                FileReport {
                                    outcome: FileOutcome::Skipped,
                                    attempts: 0,
                                }
                            }
                        }
                    })
                })
                .collect();

            for result in futures::future::join_all(tasks).await {
                match result {
                    Ok(report) => stats.absorb(report),
                    Err(e) => {
                        warn!("worker task failed: {e}");
                        stats.error += 1;
                    }
                }
            }
        }

        stats
    }
}

/// Recursively collect `*.xml` files under the inbox, stable order
pub async fn scan_inbox(root: &Path) -> ArchiverResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && has_xml_extension(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn scan_finds_xml_recursively_and_ignores_other_files() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("2024").join("11");
        tokio::fs::create_dir_all(&nested).await.unwrap();

        tokio::fs::write(tmp.path().join("a.xml"), b"<a/>").await.unwrap();
        tokio::fs::write(nested.join("b.XML"), b"<b/>").await.unwrap();
        tokio::fs::write(nested.join("notes.txt"), b"skip").await.unwrap();
        tokio::fs::write(tmp.path().join("noext"), b"skip").await.unwrap();

        let found = scan_inbox(tmp.path()).await.unwrap();
        let mut names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.xml", "b.XML"]);
    }

    #[test]
    fn batch_stats_absorb_all_outcomes() {
        let mut stats = BatchStats::default();
        stats.absorb(FileReport {
            outcome: FileOutcome::Archived,
            attempts: 1,
        });
        stats.absorb(FileReport {
            outcome: FileOutcome::Duplicate,
            attempts: 1,
        });
        stats.absorb(FileReport {
            outcome: FileOutcome::DeadLettered,
            attempts: 5,
        });
        assert_eq!(stats.success, 1);
        assert_eq!(stats.duplicate, 1);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.total_attempts, 7);
    }
}
