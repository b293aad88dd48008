//! Downloader gateway
//!
//! Uniform interface over the torrent clients the marking job talks to. Each
//! backend implements [Downloader]; the [DownloaderGateway] maps configured
//! client ids to backends and is the only thing the job calls.
//!
//! Torrent records are kept in the shape each client reports them. Reading the
//! identifier, tags or trackers returns an [ExtractError] when the client left
//! the field out, so callers decide how to degrade.

pub mod qbittorrent;
pub mod transmission;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DownloaderConfig;
use crate::error::{ConfigError, DownloaderError, ExtractError};

pub use qbittorrent::{QBittorrentClient, QbTorrent};
pub use transmission::{TrTorrent, TrTracker, TransmissionClient};

/// Torrent client backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloaderKind {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
    Transmission,
}

impl std::fmt::Display for DownloaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloaderKind::QBittorrent => write!(f, "qbittorrent"),
            DownloaderKind::Transmission => write!(f, "transmission"),
        }
    }
}

impl std::str::FromStr for DownloaderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qbittorrent" | "qb" => Ok(DownloaderKind::QBittorrent),
            "transmission" | "tr" => Ok(DownloaderKind::Transmission),
            _ => Err(ConfigError::UnknownKind(s.to_string())),
        }
    }
}

/// A completed torrent as reported by its client.
#[derive(Debug, Clone, PartialEq)]
pub enum Torrent {
    QBittorrent(QbTorrent),
    Transmission(TrTorrent),
}

impl Torrent {
    pub fn kind(&self) -> DownloaderKind {
        match self {
            Torrent::QBittorrent(_) => DownloaderKind::QBittorrent,
            Torrent::Transmission(_) => DownloaderKind::Transmission,
        }
    }

    /// Info hash used to address the torrent in write-back calls.
    pub fn identifier(&self) -> Result<&str, ExtractError> {
        let hash = match self {
            Torrent::QBittorrent(t) => t.hash.as_deref(),
            Torrent::Transmission(t) => t.hash_string.as_deref(),
        };
        hash.filter(|h| !h.is_empty())
            .ok_or(ExtractError::MissingField("info hash"))
    }

    /// Display name for logging.
    pub fn name(&self) -> &str {
        let name = match self {
            Torrent::QBittorrent(t) => t.name.as_deref(),
            Torrent::Transmission(t) => t.name.as_deref(),
        };
        name.unwrap_or("<unnamed>")
    }

    /// Current tags, in the order the client reports them.
    pub fn tags(&self) -> Result<Vec<String>, ExtractError> {
        match self {
            Torrent::QBittorrent(t) => t
                .tags
                .as_deref()
                .map(split_tags)
                .ok_or(ExtractError::MissingField("tags")),
            Torrent::Transmission(t) => t
                .labels
                .as_ref()
                .map(|labels| {
                    labels
                        .iter()
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                })
                .ok_or(ExtractError::MissingField("labels")),
        }
    }

    /// Tracker URLs considered by the classifier.
    ///
    /// qBittorrent only reports the working tracker alongside a count, so the
    /// list holds that tracker when the count is exactly one and is empty
    /// otherwise. Transmission reports every announce URL.
    pub fn trackers(&self) -> Result<Vec<&str>, ExtractError> {
        match self {
            Torrent::QBittorrent(t) => {
                let count = t
                    .trackers_count
                    .ok_or(ExtractError::MissingField("trackers_count"))?;
                if count != 1 {
                    return Ok(Vec::new());
                }
                let tracker = t
                    .tracker
                    .as_deref()
                    .ok_or(ExtractError::MissingField("tracker"))?;
                Ok(vec![tracker])
            }
            Torrent::Transmission(t) => t
                .trackers
                .as_ref()
                .map(|trackers| trackers.iter().map(|tr| tr.announce.as_str()).collect())
                .ok_or(ExtractError::MissingField("trackers")),
        }
    }
}

/// Split a comma-joined tag string ("a, b") into tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Capability interface every torrent client backend provides.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Configured id of this client.
    fn id(&self) -> &str;

    fn kind(&self) -> DownloaderKind;

    /// Torrents whose download has finished.
    async fn completed_torrents(&self) -> Result<Vec<Torrent>, DownloaderError>;

    /// Overwrite the full tag set of one torrent.
    async fn set_tags(&self, hash: &str, tags: &[String]) -> Result<(), DownloaderError>;
}

/// Registry of configured clients, addressed by id.
#[derive(Default, Clone)]
pub struct DownloaderGateway {
    clients: HashMap<String, Arc<dyn Downloader>>,
}

impl DownloaderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build backends for every enabled entry. Disabled entries are skipped.
    pub fn from_configs(configs: &[DownloaderConfig], timeout: Duration) -> Result<Self> {
        let mut gateway = Self::new();
        for config in configs {
            if !config.enabled {
                debug!(downloader = %config.id, "Downloader disabled, not registering");
                continue;
            }
            let client: Arc<dyn Downloader> = match config.kind {
                DownloaderKind::QBittorrent => Arc::new(QBittorrentClient::new(config, timeout)?),
                DownloaderKind::Transmission => {
                    Arc::new(TransmissionClient::new(config, timeout)?)
                }
            };
            info!(
                downloader = %config.id,
                kind = %config.kind,
                url = %config.url,
                "Registered downloader"
            );
            gateway.register(client);
        }
        Ok(gateway)
    }

    /// Register a backend, replacing any previous one with the same id.
    pub fn register(&mut self, client: Arc<dyn Downloader>) {
        self.clients.insert(client.id().to_string(), client);
    }

    pub fn kind(&self, id: &str) -> Option<DownloaderKind> {
        self.clients.get(id).map(|c| c.kind())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn client(&self, id: &str) -> Result<&Arc<dyn Downloader>, DownloaderError> {
        self.clients
            .get(id)
            .ok_or_else(|| DownloaderError::UnknownClient(id.to_string()))
    }

    /// Completed torrents of one client.
    pub async fn list_completed(&self, id: &str) -> Result<Vec<Torrent>, DownloaderError> {
        self.client(id)?.completed_torrents().await
    }

    /// Overwrite the tag set of one torrent on one client.
    pub async fn set_tags(
        &self,
        id: &str,
        hash: &str,
        tags: &[String],
    ) -> Result<(), DownloaderError> {
        self.client(id)?.set_tags(hash, tags).await
    }
}
