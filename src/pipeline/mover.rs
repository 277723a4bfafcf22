//! Filesystem moves between the managed staging areas and the archive
//!
//! Staging areas live under the data root; the archive tree lives under its
//! own (possibly remote-mounted) root. Every move creates the target
//! directory tree first and never leaves a half-written file observable at
//! the destination.

use crate::domain::ExtractedDocument;
use crate::error::{ArchiverError, ArchiverResult};
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Moves files between the inbox, staging areas and the archive
#[derive(Debug, Clone)]
pub struct FileMover {
    quarantine_dir: PathBuf,
    processing_dir: PathBuf,
    failed_dir: PathBuf,
    dead_letter_dir: PathBuf,
    duplicates_dir: PathBuf,
    archive_root: PathBuf,
}

impl FileMover {
    pub fn new(data_root: &Path, archive_root: PathBuf) -> Self {
        Self {
            quarantine_dir: data_root.join("quarantine"),
            processing_dir: data_root.join("processing"),
            failed_dir: data_root.join("failed"),
            dead_letter_dir: data_root.join("dead_letter"),
            duplicates_dir: data_root.join("duplicates"),
            archive_root,
        }
    }

    /// Create every staging area
    pub async fn ensure_areas(&self) -> ArchiverResult<()> {
        for dir in [
            &self.quarantine_dir,
            &self.processing_dir,
            &self.failed_dir,
            &self.dead_letter_dir,
            &self.duplicates_dir,
        ] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    pub fn processing_dir(&self) -> &Path {
        &self.processing_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    pub fn dead_letter_dir(&self) -> &Path {
        &self.dead_letter_dir
    }

    pub fn duplicates_dir(&self) -> &Path {
        &self.duplicates_dir
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Move an inbox file into quarantine under a timestamp-prefixed name,
    /// so the same filename can reappear without colliding
    pub async fn quarantine(&self, source: &Path) -> ArchiverResult<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| ArchiverError::Other(format!("no filename in {}", source.display())))?
            .to_string_lossy();
        let prefix = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let target = self.quarantine_dir.join(format!("{prefix}_{name}"));
        self.move_file(source, &target).await?;
        Ok(target)
    }

    /// Move a file that exhausted its retry budget into the dead-letter area
    pub async fn to_dead_letter(&self, source: &Path) -> ArchiverResult<PathBuf> {
        let target = self.dead_letter_dir.join(staged_name(source)?);
        self.move_file(source, &target).await?;
        Ok(target)
    }

    /// Preserve a quarantine file whose destination already exists
    pub async fn to_duplicates(&self, source: &Path) -> ArchiverResult<PathBuf> {
        let target = self.duplicates_dir.join(staged_name(source)?);
        self.move_file(source, &target).await?;
        Ok(target)
    }

    /// Final archive path for an extracted document:
    /// `<root>/<NAME> - <TAX_ID>/<KIND>/<YYYY>/<MM-YYYY>/<DD>/<original>`
    pub fn archive_destination(
        &self,
        record: &ExtractedDocument,
        canonical_name: &str,
        original_filename: &str,
    ) -> PathBuf {
        let date = record.emission_date;
        self.archive_root
            .join(format!("{} - {}", canonical_name, record.tax_id))
            .join(record.kind.to_string())
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}-{:04}", date.month(), date.year()))
            .join(format!("{:02}", date.day()))
            .join(original_filename)
    }

    /// Move `source` to `target`, creating the target directory tree.
    ///
    /// Rename is tried first; when the target sits on another volume the
    /// content is copied to a hidden temp name next to the target and
    /// renamed into place, so the target never appears half-written.
    pub async fn move_file(&self, source: &Path, target: &Path) -> ArchiverResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        if fs::rename(source, target).await.is_ok() {
            return Ok(());
        }

        let tmp_name = format!(
            ".{}.incoming",
            target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "file".to_string())
        );
        let tmp = target.with_file_name(tmp_name);

        if let Err(e) = fs::copy(source, &tmp).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        fs::remove_file(source).await?;
        Ok(())
    }

    /// Look for a file by its original name across the staging areas.
    /// Quarantine entries carry a timestamp prefix, so both exact and
    /// suffix matches are accepted.
    pub async fn find_staged_file(&self, filename: &str) -> ArchiverResult<Option<PathBuf>> {
        for dir in [&self.quarantine_dir, &self.processing_dir, &self.failed_dir] {
            if !dir.exists() {
                continue;
            }
            let mut entries = fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == filename
                    || original_filename(&name) == filename
                    || name.ends_with(&format!("_{filename}"))
                {
                    return Ok(Some(entry.path()));
                }
            }
        }
        Ok(None)
    }
}

fn staged_name(source: &Path) -> ArchiverResult<String> {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiverError::Other(format!("no filename in {}", source.display())))
}

/// Strip the quarantine timestamp prefix, returning the original filename
pub fn original_filename(staged: &str) -> &str {
    let mut parts = staged.splitn(4, '_');
    if let (Some(date), Some(time), Some(micros), Some(rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    {
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if date.len() == 8
            && time.len() == 6
            && micros.len() == 6
            && all_digits(date)
            && all_digits(time)
            && all_digits(micros)
        {
            return rest;
        }
    }
    staged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentKind;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn mover(tmp: &TempDir) -> FileMover {
        FileMover::new(&tmp.path().join("data"), tmp.path().join("archive"))
    }

    #[tokio::test]
    async fn quarantine_prefixes_a_timestamp() {
        let tmp = TempDir::new().unwrap();
        let mover = mover(&tmp);
        mover.ensure_areas().await.unwrap();

        let inbox = tmp.path().join("nota.xml");
        tokio::fs::write(&inbox, b"<xml/>").await.unwrap();

        let staged = mover.quarantine(&inbox).await.unwrap();
        assert!(!inbox.exists());
        assert!(staged.exists());

        let name = staged.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_nota.xml"));
        assert_eq!(original_filename(&name), "nota.xml");
    }

    #[test]
    fn original_filename_passes_through_unprefixed_names() {
        assert_eq!(original_filename("nota.xml"), "nota.xml");
        assert_eq!(original_filename("nota_fiscal_setembro_v2.xml"), "nota_fiscal_setembro_v2.xml");
        assert_eq!(
            original_filename("20241106_103000_123456_nota.xml"),
            "nota.xml"
        );
    }

    #[test]
    fn archive_destination_layout() {
        let tmp = TempDir::new().unwrap();
        let mover = mover(&tmp);
        let record = ExtractedDocument {
            access_key: "35241112345678000190550010000001231234567890".into(),
            tax_id: "12345678000190".into(),
            issuer_name: "Empresa Teste Ltda".into(),
            emission_date: NaiveDate::from_ymd_opt(2024, 11, 6).unwrap(),
            processed_date: NaiveDate::from_ymd_opt(2024, 11, 10).unwrap(),
            kind: DocumentKind::Nfe,
        };

        let dest = mover.archive_destination(&record, "EMPRESA TESTE LTDA", "nota.xml");
        assert_eq!(
            dest,
            tmp.path()
                .join("archive")
                .join("EMPRESA TESTE LTDA - 12345678000190")
                .join("NFE")
                .join("2024")
                .join("11-2024")
                .join("06")
                .join("nota.xml")
        );
    }

    #[tokio::test]
    async fn move_file_creates_the_target_tree() {
        let tmp = TempDir::new().unwrap();
        let mover = mover(&tmp);

        let src = tmp.path().join("src.xml");
        tokio::fs::write(&src, b"content").await.unwrap();

        let dst = tmp.path().join("a").join("b").join("c").join("dst.xml");
        mover.move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn find_staged_file_matches_prefixed_quarantine_names() {
        let tmp = TempDir::new().unwrap();
        let mover = mover(&tmp);
        mover.ensure_areas().await.unwrap();

        let staged = mover
            .quarantine_dir()
            .join("20241106_103000_123456_nota.xml");
        tokio::fs::write(&staged, b"<xml/>").await.unwrap();

        let found = mover.find_staged_file("nota.xml").await.unwrap();
        assert_eq!(found, Some(staged));

        assert!(mover
            .find_staged_file("missing.xml")
            .await
            .unwrap()
            .is_none());
    }
}
