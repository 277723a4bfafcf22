#![allow(dead_code)]

//! Shared fixtures for the integration suite

use fiscal_archiver::config::Settings;
use fiscal_archiver::infrastructure::database::entities;
use fiscal_archiver::ArchiverCore;
use sea_orm::{EntityTrait, QueryOrder};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ACCESS_KEY_1: &str = "35241112345678000190550010000001231234567890";
pub const ACCESS_KEY_2: &str = "35241112345678000190550010000009998887776665";
pub const TAX_ID: &str = "12345678000190";

/// Minimal but realistic NF-e document. `filler` varies the bytes without
/// touching any extracted field.
pub fn nfe_xml(access_key: &str, model: &str, issuer: &str, filler: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{access_key}" versao="4.00">
      <ide>
        <cUF>35</cUF>
        <natOp>VENDA</natOp>
        <mod>{model}</mod>
        <serie>1</serie>
        <nNF>123</nNF>
        <dhEmi>2024-11-06T10:30:00-03:00</dhEmi>
        <verProc>1.0{filler}</verProc>
      </ide>
      <emit>
        <CNPJ>{TAX_ID}</CNPJ>
        <xNome>{issuer}</xNome>
        <enderEmit>
          <xMun>SAO PAULO</xMun>
          <UF>SP</UF>
        </enderEmit>
      </emit>
    </infNFe>
  </NFe>
</nfeProc>"#
    )
}

pub fn settings_for(tmp: &TempDir) -> Settings {
    Settings {
        source_directory: tmp.path().join("inbox"),
        destination_directory: tmp.path().join("archive"),
        data_root: tmp.path().join("data"),
        max_retry_attempts: 3,
        retry_delay_base: 0,
        ..Default::default()
    }
}

pub async fn bootstrap(tmp: &TempDir) -> ArchiverCore {
    bootstrap_with(tmp, |_| {}).await
}

pub async fn bootstrap_with<F>(tmp: &TempDir, tweak: F) -> ArchiverCore
where
    F: FnOnce(&mut Settings),
{
    let mut settings = settings_for(tmp);
    tweak(&mut settings);
    tokio::fs::create_dir_all(&settings.source_directory)
        .await
        .unwrap();
    ArchiverCore::bootstrap(settings).await.unwrap()
}

/// Drop a file into the inbox, returning its path
pub async fn write_inbox(core: &ArchiverCore, name: &str, content: &str) -> PathBuf {
    let path = core.settings().source_directory.join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}

pub async fn documents(core: &ArchiverCore) -> Vec<entities::document::Model> {
    entities::Document::find()
        .all(core.catalog().conn())
        .await
        .unwrap()
}

pub async fn audits(core: &ArchiverCore) -> Vec<entities::processing_audit::Model> {
    entities::ProcessingAudit::find()
        .order_by_asc(entities::processing_audit::Column::Id)
        .all(core.catalog().conn())
        .await
        .unwrap()
}

pub async fn attempts_for(
    core: &ArchiverCore,
    audit_id: i32,
) -> Vec<entities::processing_attempt::Model> {
    use sea_orm::{ColumnTrait, QueryFilter};
    entities::ProcessingAttempt::find()
        .filter(entities::processing_attempt::Column::AuditId.eq(audit_id))
        .order_by_asc(entities::processing_attempt::Column::AttemptNumber)
        .all(core.catalog().conn())
        .await
        .unwrap()
}

pub async fn reconciliation_runs(
    core: &ArchiverCore,
) -> Vec<entities::reconciliation_log::Model> {
    entities::ReconciliationLog::find()
        .all(core.catalog().conn())
        .await
        .unwrap()
}

/// Every regular file under `root`, recursively
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// The S1 destination for the canonical sample document
pub fn expected_destination(core: &ArchiverCore, filename: &str) -> PathBuf {
    core.settings()
        .destination_directory
        .join(format!("EMPRESA TESTE LTDA - {TAX_ID}"))
        .join("NFE")
        .join("2024")
        .join("11-2024")
        .join("06")
        .join(filename)
}
