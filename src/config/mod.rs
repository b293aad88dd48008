//! Application configuration management

pub mod store;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::services::downloader::DownloaderKind;

pub use store::{ConfigStore, JsonFileStore, MemoryConfigStore};

/// Process configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Settings document (downloaders, mark schedule, OCR host)
    pub settings_path: PathBuf,

    /// OCR server host, overrides the value in the settings document
    pub ocr_server_host: Option<String>,

    /// Per-request timeout for downloader HTTP calls
    pub downloader_timeout: Duration,

    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let settings_path = match env::var("TORRENTMARK_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_settings_path(),
        };

        let downloader_timeout = Duration::from_secs(
            env::var("DOWNLOADER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid DOWNLOADER_TIMEOUT_SECS")?,
        );

        Ok(Self {
            settings_path,
            ocr_server_host: env::var("OCR_SERVER_HOST").ok().filter(|h| !h.is_empty()),
            downloader_timeout,
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("torrentmark").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("./data/config.json"))
}

/// The persisted settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub downloaders: Vec<DownloaderConfig>,

    #[serde(default)]
    pub torrent_mark: MarkSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_server_host: Option<String>,
}

/// Connection details for one torrent client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: DownloaderKind,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Schedule settings for the PT/BT marking job.
///
/// A new value is built for every reconfiguration; running passes keep the
/// snapshot they were started with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSettings {
    #[serde(default)]
    pub enabled: bool,

    /// 5-field cron expression
    #[serde(default)]
    pub cron: Option<String>,

    /// Run a pass immediately; cleared and persisted once the pass is queued
    #[serde(default)]
    pub run_once: bool,

    /// Downloader ids to scan, in order
    #[serde(default)]
    pub downloaders: Vec<String>,

    /// Extra tracker URL substrings that mark a closed tracker
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_markers: Vec<String>,
}

impl MarkSettings {
    /// Cron expression with surrounding whitespace removed, if one is set.
    pub fn cron(&self) -> Option<&str> {
        self.cron.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Whether the recurring schedule should be registered.
    pub fn is_active(&self) -> bool {
        self.enabled && self.cron().is_some() && !self.downloaders.is_empty()
    }

    /// Scheduler expression for the configured cron, if any.
    pub fn job_schedule(&self) -> Result<Option<String>, ConfigError> {
        self.cron().map(to_job_schedule).transpose()
    }
}

/// Convert a 5-field crontab expression into the 6-field form the job scheduler
/// expects (seconds first).
pub fn to_job_schedule(cron: &str) -> Result<String, ConfigError> {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ConfigError::InvalidCron(cron.to_string()));
    }
    Ok(format!("0 {}", fields.join(" ")))
}
