//! Runtime configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

fn default_max_workers() -> usize {
    4
}
fn default_scan_interval() -> u64 {
    30
}
fn default_batch_size() -> usize {
    50
}
fn default_max_retry_attempts() -> u32 {
    5
}
fn default_retry_delay_base() -> u64 {
    2
}
fn default_reconciliation_interval() -> u64 {
    300
}
fn default_process_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Archiver settings, loadable from a TOML file with environment overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Inbox scanned recursively for XML files
    #[serde(default)]
    pub source_directory: PathBuf,

    /// Archive root (often a network mount)
    #[serde(default)]
    pub destination_directory: PathBuf,

    /// Parent of the staging areas, catalog and audit log
    #[serde(default)]
    pub data_root: PathBuf,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    #[serde(default = "default_retry_delay_base")]
    pub retry_delay_base: u64,

    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval_secs: u64,

    /// Budget for one attempt; the per-file deadline covers the whole
    /// retry schedule
    #[serde(default = "default_process_timeout")]
    pub process_timeout_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::new(),
            destination_directory: PathBuf::new(),
            data_root: PathBuf::new(),
            max_workers: default_max_workers(),
            scan_interval_secs: default_scan_interval(),
            batch_size: default_batch_size(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_base: default_retry_delay_base(),
            reconciliation_interval_secs: default_reconciliation_interval(),
            process_timeout_secs: default_process_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load from an optional TOML file, then apply environment overrides
    /// and validate
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) if path.exists() => {
                info!("loading config from {:?}", path);
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            Some(path) => {
                warn!("config file {:?} not found, using defaults", path);
                Settings::default()
            }
            None => Settings::default(),
        };

        settings.apply_overrides(std::env::vars())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `KEY=value` overrides from an environment-shaped iterator
    fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "SOURCE_DIRECTORY" => self.source_directory = PathBuf::from(value),
                "DESTINATION_NETWORK_DIRECTORY" => {
                    self.destination_directory = PathBuf::from(value)
                }
                "DATA_ROOT" => self.data_root = PathBuf::from(value),
                "MAX_WORKERS" => self.max_workers = parse(&key, &value)?,
                "SCAN_INTERVAL" => self.scan_interval_secs = parse(&key, &value)?,
                "BATCH_SIZE" => self.batch_size = parse(&key, &value)?,
                "MAX_RETRY_ATTEMPTS" => self.max_retry_attempts = parse(&key, &value)?,
                "RETRY_DELAY_BASE" => self.retry_delay_base = parse(&key, &value)?,
                "RECONCILIATION_INTERVAL" => {
                    self.reconciliation_interval_secs = parse(&key, &value)?
                }
                "PROCESS_TIMEOUT" => self.process_timeout_secs = parse(&key, &value)?,
                "LOG_LEVEL" => self.log_level = value,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_directory.as_os_str().is_empty() {
            bail!("SOURCE_DIRECTORY is not configured");
        }
        if self.destination_directory.as_os_str().is_empty() {
            bail!("DESTINATION_NETWORK_DIRECTORY is not configured");
        }
        if self.data_root.as_os_str().is_empty() {
            bail!("DATA_ROOT is not configured");
        }
        if self.max_workers == 0 {
            bail!("MAX_WORKERS must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("BATCH_SIZE must be at least 1");
        }
        if self.max_retry_attempts == 0 {
            bail!("MAX_RETRY_ATTEMPTS must be at least 1");
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_root.join("archiver.db")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_root.join("audit.log")
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_secs(self.reconciliation_interval_secs)
    }

    /// Deadline for one file covering every attempt plus the backoff sleeps
    /// between them
    pub fn file_deadline(&self) -> Duration {
        let backoff: u64 = (1..self.max_retry_attempts)
            .map(|k| self.retry_delay_base.saturating_pow(k))
            .sum();
        Duration::from_secs(
            self.process_timeout_secs
                .saturating_mul(self.max_retry_attempts as u64)
                .saturating_add(backoff),
        )
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key}={value}: {e}"))
}
