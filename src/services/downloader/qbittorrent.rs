//! qBittorrent Web API (v2) backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Downloader, DownloaderKind, Torrent, split_tags};
use crate::config::DownloaderConfig;
use crate::error::DownloaderError;

/// Torrent entry from `/api/v2/torrents/info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QbTorrent {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Comma-joined tag list
    #[serde(default)]
    pub tags: Option<String>,
    /// Currently working tracker
    #[serde(default)]
    pub tracker: Option<String>,
    #[serde(default)]
    pub trackers_count: Option<u32>,
}

pub struct QBittorrentClient {
    id: String,
    base_url: String,
    username: Option<String>,
    password: String,
    client: Client,
    logged_in: AtomicBool,
}

impl QBittorrentClient {
    pub fn new(config: &DownloaderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            id: config.id.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone().filter(|u| !u.is_empty()),
            password: config.password.clone().unwrap_or_default(),
            client,
            logged_in: AtomicBool::new(false),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    async fn login(&self) -> Result<(), DownloaderError> {
        let Some(username) = &self.username else {
            // No credentials configured: rely on the client's auth bypass.
            return Ok(());
        };

        let resp = self
            .client
            .post(self.endpoint("auth/login"))
            .header(reqwest::header::REFERER, &self.base_url)
            .form(&[("username", username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|e| DownloaderError::http(&self.id, e))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() || body.trim() != "Ok." {
            self.logged_in.store(false, Ordering::SeqCst);
            return Err(DownloaderError::Auth {
                client: self.id.clone(),
                reason: format!("status {}, body '{}'", status.as_u16(), body.trim()),
            });
        }

        debug!(downloader = %self.id, "Logged in to qBittorrent");
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Send a request, logging in first if needed and once more if the
    /// session expired.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, DownloaderError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login().await?;
        }

        let mut resp = build()
            .send()
            .await
            .map_err(|e| DownloaderError::http(&self.id, e))?;

        if resp.status() == StatusCode::FORBIDDEN {
            warn!(downloader = %self.id, "qBittorrent session rejected, logging in again");
            self.logged_in.store(false, Ordering::SeqCst);
            self.login().await?;
            resp = build()
                .send()
                .await
                .map_err(|e| DownloaderError::http(&self.id, e))?;
        }

        if !resp.status().is_success() {
            return Err(DownloaderError::status(&self.id, resp.status()));
        }
        Ok(resp)
    }

    /// Tags qBittorrent currently holds for one torrent.
    async fn current_tags(&self, hash: &str) -> Result<Vec<String>, DownloaderError> {
        let url = self.endpoint("torrents/info");
        let resp = self
            .send(|| self.client.get(&url).query(&[("hashes", hash)]))
            .await?;

        let torrents: Vec<QbTorrent> = resp
            .json()
            .await
            .map_err(|e| DownloaderError::http(&self.id, e))?;
        Ok(torrents
            .first()
            .and_then(|t| t.tags.as_deref())
            .map(split_tags)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Downloader for QBittorrentClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DownloaderKind {
        DownloaderKind::QBittorrent
    }

    async fn completed_torrents(&self) -> Result<Vec<Torrent>, DownloaderError> {
        let url = self.endpoint("torrents/info");
        let resp = self
            .send(|| self.client.get(&url).query(&[("filter", "completed")]))
            .await?;

        let torrents: Vec<QbTorrent> = resp
            .json()
            .await
            .map_err(|e| DownloaderError::http(&self.id, e))?;
        Ok(torrents.into_iter().map(Torrent::QBittorrent).collect())
    }

    async fn set_tags(&self, hash: &str, tags: &[String]) -> Result<(), DownloaderError> {
        // Add first: a failed write must never leave the torrent without tags.
        if !tags.is_empty() {
            let joined = tags.join(",");
            let add_url = self.endpoint("torrents/addTags");
            self.send(|| {
                self.client
                    .post(&add_url)
                    .form(&[("hashes", hash), ("tags", joined.as_str())])
            })
            .await?;
        }

        let stale: Vec<String> = self
            .current_tags(hash)
            .await?
            .into_iter()
            .filter(|t| !tags.contains(t))
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        let joined = stale.join(",");
        let remove_url = self.endpoint("torrents/removeTags");
        self.send(|| {
            self.client
                .post(&remove_url)
                .form(&[("hashes", hash), ("tags", joined.as_str())])
        })
        .await?;
        Ok(())
    }
}
