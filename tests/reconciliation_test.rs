//! Reconciliation scenarios: crash recovery, stranded files and lost-file
//! audit closure

mod helpers;

use chrono::{NaiveDate, Utc};
use fiscal_archiver::catalog::{AuditPatch, InsertOutcome, NewDocument};
use fiscal_archiver::domain::ProcessingStatus;
use fiscal_archiver::pipeline::hash_file;
use helpers::*;
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

fn drain_thresholds() -> (Duration, chrono::Duration) {
    (Duration::ZERO, chrono::Duration::zero())
}

#[tokio::test]
async fn s5_crash_between_insert_and_move_is_healed() {
    let tmp = TempDir::new().unwrap();

    // First process life: the catalog commit landed but the move never ran
    let xml = nfe_xml(ACCESS_KEY_1, "55", "EMPRESA TESTE LTDA", "");
    let destination = {
        let core = bootstrap(&tmp).await;

        let staged = core
            .pipeline()
            .mover()
            .quarantine_dir()
            .join("20240101_000000_000001_nota.xml");
        tokio::fs::write(&staged, &xml).await.unwrap();
        let content_hash = hash_file(&staged).await.unwrap();

        let issuer_id = core
            .catalog()
            .upsert_issuer(TAX_ID, "EMPRESA TESTE LTDA")
            .await
            .unwrap();

        let destination = expected_destination(&core, "nota.xml");
        let outcome = core
            .catalog()
            .insert_document(NewDocument {
                access_key: ACCESS_KEY_1.to_string(),
                content_hash: content_hash.clone(),
                issuer_id,
                processed_date: Utc::now().date_naive(),
                emission_date: NaiveDate::from_ymd_opt(2024, 11, 6).unwrap(),
                kind: "NFE".to_string(),
                final_destination: destination.display().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(1));

        let audit_id = core
            .catalog()
            .create_audit(&content_hash, "nota.xml", "/inbox/nota.xml")
            .await
            .unwrap();
        core.catalog()
            .update_audit(
                audit_id,
                AuditPatch {
                    status: Some(ProcessingStatus::DbInserted),
                    attempt_count: Some(1),
                    last_attempt_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        destination
        // core dropped here: the "crash"
    };

    // Restart: caches rehydrate from the catalog, reconciliation recovers
    let core = bootstrap(&tmp).await;
    assert_eq!(core.cache().len(), 1);

    let (stale, stuck) = drain_thresholds();
    let stats = core.reconciler().with_thresholds(stale, stuck).run().await;
    assert!(stats.issues_fixed >= 1);

    // Final state equals the happy path: one row, file in place
    let docs = documents(&core).await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].access_key, ACCESS_KEY_1);
    assert_eq!(
        tokio::fs::read_to_string(&destination).await.unwrap(),
        xml
    );

    // The interrupted journey's audit row closed as SUCCESS
    let audit_rows = audits(&core).await;
    assert_eq!(audit_rows.len(), 1);
    assert_eq!(audit_rows[0].current_status, "SUCCESS");

    // Quarantine is clean
    assert!(files_under(core.pipeline().mover().quarantine_dir()).is_empty());
}

#[tokio::test]
async fn s6_stranded_quarantine_file_without_audit_row_is_processed() {
    let tmp = TempDir::new().unwrap();
    let core = bootstrap(&tmp).await;

    let staged = core
        .pipeline()
        .mover()
        .quarantine_dir()
        .join("20240101_000000_000002_perdida.xml");
    tokio::fs::write(&staged, nfe_xml(ACCESS_KEY_1, "55", "EMPRESA TESTE LTDA", ""))
        .await
        .unwrap();

    let (stale, stuck) = drain_thresholds();
    let stats = core.reconciler().with_thresholds(stale, stuck).run().await;
    assert_eq!(stats.issues_found, 1);
    assert_eq!(stats.issues_fixed, 1);

    // Processed end to end under its original filename
    let destination = expected_destination(&core, "perdida.xml");
    assert!(destination.is_file());
    assert_eq!(documents(&core).await.len(), 1);

    let audit_rows = audits(&core).await;
    assert_eq!(audit_rows.len(), 1);
    assert_eq!(audit_rows[0].current_status, "SUCCESS");
    assert_eq!(audit_rows[0].filename, "perdida.xml");

    // The run itself is on the record
    let runs = reconciliation_runs(&core).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].issues_fixed, 1);

    let log = std::fs::read_to_string(core.settings().audit_log_path()).unwrap();
    assert!(log.contains("RECONCILIATION_COMPLETED"));
}

#[tokio::test]
async fn stuck_audit_with_lost_file_is_closed_permanently() {
    let tmp = TempDir::new().unwrap();
    let core = bootstrap(&tmp).await;

    let audit_id = core
        .catalog()
        .create_audit("deadbeef", "sumiu.xml", "/inbox/sumiu.xml")
        .await
        .unwrap();
    core.catalog()
        .update_audit(
            audit_id,
            AuditPatch {
                status: Some(ProcessingStatus::Processing),
                attempt_count: Some(1),
                last_attempt_at: Some(Utc::now() - chrono::Duration::minutes(20)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Default thresholds: 20 minutes without progress is well past stuck
    let stats = core.reconciler().run().await;
    assert_eq!(stats.issues_found, 1);
    assert_eq!(stats.issues_fixed, 1);

    let audit = core.catalog().audit_by_id(audit_id).await.unwrap().unwrap();
    assert_eq!(audit.current_status, "FAILED_PERMANENT");
    assert_eq!(
        audit.last_error_message.as_deref(),
        Some("file lost during reconciliation")
    );
    assert_eq!(audit.last_error_kind.as_deref(), Some("FILE_NOT_FOUND"));
    assert!(audit.completed_at.is_some());
}

#[tokio::test]
async fn fresh_quarantine_files_are_left_alone() {
    let tmp = TempDir::new().unwrap();
    let core = bootstrap(&tmp).await;

    let staged = core
        .pipeline()
        .mover()
        .quarantine_dir()
        .join("20240101_000000_000003_nova.xml");
    tokio::fs::write(&staged, nfe_xml(ACCESS_KEY_1, "55", "EMPRESA TESTE LTDA", ""))
        .await
        .unwrap();

    // Default 300s staleness: a just-written file is still in flight
    let stats = core.reconciler().run().await;
    assert_eq!(stats.issues_found, 0);
    assert!(staged.exists());
    assert!(documents(&core).await.is_empty());
}
