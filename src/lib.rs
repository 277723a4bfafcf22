//! Fiscal XML archiver
//!
//! A reliable ingestion pipeline for Brazilian fiscal documents (NF-e and
//! NFC-e): files land in a watched inbox, pass through quarantine, parsing
//! and an atomic catalog-insert + archive-move transaction, with bounded
//! retries, a dead-letter queue, a full audit trail and a periodic
//! reconciliation sweep.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod infrastructure;
pub mod orchestrator;
pub mod pipeline;
pub mod reconciler;

use crate::audit::{AuditEvent, AuditSink, AuditTrail, FileAuditSink};
use crate::catalog::CatalogStore;
use crate::config::Settings;
use crate::infrastructure::database::Database;
use crate::orchestrator::Orchestrator;
use crate::pipeline::{FileMover, IdempotencyCache, Pipeline};
use crate::reconciler::Reconciler;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Wired-up archiver: database, catalog, caches, audit trail and pipeline
pub struct ArchiverCore {
    settings: Settings,
    catalog: Arc<CatalogStore>,
    cache: Arc<IdempotencyCache>,
    audit: Arc<AuditTrail>,
    pipeline: Arc<Pipeline>,
}

impl ArchiverCore {
    /// Open the catalog, create the staging areas and hydrate the
    /// idempotency cache
    pub async fn bootstrap(settings: Settings) -> Result<Self> {
        settings.validate()?;

        tokio::fs::create_dir_all(&settings.data_root)
            .await
            .with_context(|| format!("failed to create {}", settings.data_root.display()))?;

        let db = Arc::new(
            Database::open(&settings.catalog_path())
                .await
                .context("failed to open catalog database")?,
        );
        let catalog = Arc::new(CatalogStore::new(db));

        let file_sink: Arc<dyn AuditSink> =
            Arc::new(FileAuditSink::new(settings.audit_log_path()));
        let audit = Arc::new(AuditTrail::new(catalog.clone(), vec![file_sink]));

        let mover = FileMover::new(
            &settings.data_root,
            settings.destination_directory.clone(),
        );
        mover
            .ensure_areas()
            .await
            .context("failed to create staging areas")?;

        let cache = Arc::new(IdempotencyCache::new());
        let (hashes, keys) = catalog
            .load_processed_sets()
            .await
            .context("failed to hydrate idempotency cache")?;
        cache.hydrate(hashes, keys);
        info!("idempotency cache hydrated with {} document(s)", cache.len());

        let pipeline = Arc::new(Pipeline::new(
            catalog.clone(),
            cache.clone(),
            mover,
            audit.clone(),
            settings.max_retry_attempts,
            settings.retry_delay_base,
        ));

        Ok(Self {
            settings,
            catalog,
            cache,
            audit,
            pipeline,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<IdempotencyCache> {
        &self.cache
    }

    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.catalog.clone(), self.pipeline.clone(), self.audit.clone())
    }

    /// Run the orchestrator loop until the shutdown signal flips
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.audit
            .emit(AuditEvent::SystemStarted {
                source_directory: self.settings.source_directory.display().to_string(),
                archive_root: self.settings.destination_directory.display().to_string(),
                workers: self.settings.max_workers,
            })
            .await;

        let reconciler = self.reconciler();
        let mut orchestrator = Orchestrator::new(
            self.settings.clone(),
            self.pipeline.clone(),
            reconciler,
            shutdown,
        );
        let result = orchestrator.run().await;

        self.audit.emit(AuditEvent::SystemStopped).await;
        result.map_err(Into::into)
    }
}
