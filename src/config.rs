use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::devices::RetryPolicy;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/printlog/config.toml";

/// Where the second stage of a save sends its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MirrorType {
    None,
    GoogleSheets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Newline-separated printer addresses.
    pub printers_file: PathBuf,
    /// Append-only CSV log of every recorded job.
    pub log_path: PathBuf,
    pub sheet_name: String,
    pub credentials_path: PathBuf,
    pub mirror: MirrorType,
    pub max_retries: u32,
    /// Exponential backoff factor in seconds.
    pub retry_backoff: f64,
    pub request_timeout_secs: u64,
    /// Jobs requested per history page.
    pub page_size: usize,
    /// Rows per spreadsheet append call.
    pub remote_batch_size: usize,
    /// Pause between spreadsheet append calls.
    pub mirror_pacing_ms: u64,
    /// IANA zone that job timestamps are localized to.
    pub timezone: String,
    pub verbose: bool,
    pub json_logs: bool,
    pub simulation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printers_file: PathBuf::from("printer_ips.txt"),
            log_path: PathBuf::from("ultimaker_logs.csv"),
            sheet_name: "Sheet1".to_string(),
            credentials_path: PathBuf::from("/etc/printlog/credentials.json"),
            mirror: MirrorType::GoogleSheets,
            max_retries: 3,
            retry_backoff: 0.5,
            request_timeout_secs: 10,
            page_size: 50,
            remote_batch_size: 100,
            mirror_pacing_ms: 1000,
            timezone: "America/Los_Angeles".to_string(),
            verbose: false,
            json_logs: false,
            simulation: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `PRINTLOG_*` environment variables and
    /// command-line overrides (highest priority), then validate the result.
    pub fn new<T: Serialize>(config_file: &Path, overrides: Option<&T>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("PRINTLOG_"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let config: AppConfig = figment
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_file.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.remote_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        self.tz()?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mirror_pacing(&self) -> Duration {
        Duration::from_millis(self.mirror_pacing_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: self.retry_backoff,
        }
    }
}
