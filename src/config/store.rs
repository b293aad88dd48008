//! Persistence for the settings document.
//!
//! The marking service only ever writes its own section back (to clear the
//! run-once flag); everything else is read-only to it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{MarkSettings, Settings};

/// Backing store for [Settings].
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the full settings document.
    async fn load(&self) -> Result<Settings>;

    /// Replace the marking section of the document.
    async fn save_mark_settings(&self, settings: &MarkSettings) -> Result<()>;
}

/// Settings kept in a JSON file on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<Settings> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No settings file found, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };

        serde_json::from_slice(&body)
            .with_context(|| format!("Invalid settings file {}", self.path.display()))
    }

    async fn save_mark_settings(&self, settings: &MarkSettings) -> Result<()> {
        let mut document = self.load().await?;
        document.torrent_mark = settings.clone();
        self.write(&document).await?;
        debug!(path = %self.path.display(), "Mark settings persisted");
        Ok(())
    }
}

/// In-process store, used when the host applies configuration programmatically.
#[derive(Default)]
pub struct MemoryConfigStore {
    settings: RwLock<Settings>,
}

impl MemoryConfigStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Current contents of the store.
    pub fn snapshot(&self) -> Settings {
        self.settings.read().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Settings> {
        Ok(self.snapshot())
    }

    async fn save_mark_settings(&self, settings: &MarkSettings) -> Result<()> {
        self.settings.write().torrent_mark = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloaderConfig;
    use crate::services::downloader::DownloaderKind;
    use pretty_assertions::assert_eq;

    fn sample() -> Settings {
        Settings {
            downloaders: vec![DownloaderConfig {
                id: "tr".to_string(),
                name: Some("Seedbox".to_string()),
                kind: DownloaderKind::Transmission,
                url: "http://seedbox:9091".to_string(),
                username: Some("admin".to_string()),
                password: Some("secret".to_string()),
                enabled: true,
            }],
            torrent_mark: MarkSettings {
                enabled: true,
                cron: Some("0 */2 * * *".to_string()),
                run_once: true,
                downloaders: vec!["tr".to_string()],
                private_markers: Vec::new(),
            },
            ocr_server_host: Some("http://ocr:9300".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_mark_settings_keeps_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = JsonFileStore::new(&path);
        store.write(&sample()).await.unwrap();

        let mut mark = sample().torrent_mark;
        mark.run_once = false;
        store.save_mark_settings(&mark).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert!(!reloaded.torrent_mark.run_once);
        assert_eq!(reloaded.downloaders, sample().downloaders);
        assert_eq!(reloaded.ocr_server_host, sample().ocr_server_host);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::new(path).load().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryConfigStore::new(sample());
        let mut mark = sample().torrent_mark;
        mark.run_once = false;
        store.save_mark_settings(&mark).await.unwrap();
        assert_eq!(store.snapshot().torrent_mark, mark);
    }
}
