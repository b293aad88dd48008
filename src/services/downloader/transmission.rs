//! Transmission RPC backend.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Downloader, DownloaderKind, Torrent};
use crate::config::DownloaderConfig;
use crate::error::DownloaderError;

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// `tr_torrent_activity` values for finished torrents.
pub const STATUS_SEED_WAIT: i64 = 5;
pub const STATUS_SEED: i64 = 6;

const TORRENT_FIELDS: &[&str] = &["hashString", "name", "labels", "trackers", "status"];

/// Torrent entry from `torrent-get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrTorrent {
    #[serde(default)]
    pub hash_string: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub trackers: Option<Vec<TrTracker>>,
    #[serde(default)]
    pub status: Option<i64>,
}

impl TrTorrent {
    fn is_completed(&self) -> bool {
        matches!(self.status, Some(STATUS_SEED_WAIT) | Some(STATUS_SEED))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrTracker {
    pub announce: String,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, A> {
    method: &'a str,
    arguments: A,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: String,
    #[serde(default = "Option::default")]
    arguments: Option<T>,
}

#[derive(Debug, Serialize)]
struct TorrentGetArgs {
    fields: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct TorrentGetResult {
    #[serde(default)]
    torrents: Vec<TrTorrent>,
}

#[derive(Debug, Serialize)]
struct TorrentSetArgs<'a> {
    ids: [&'a str; 1],
    labels: &'a [String],
}

pub struct TransmissionClient {
    id: String,
    rpc_url: String,
    username: Option<String>,
    password: Option<String>,
    client: Client,
    session_id: RwLock<Option<String>>,
}

impl TransmissionClient {
    pub fn new(config: &DownloaderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base = config.url.trim_end_matches('/');
        let rpc_url = if base.ends_with("/transmission/rpc") {
            base.to_string()
        } else {
            format!("{base}/transmission/rpc")
        };

        Ok(Self {
            id: config.id.clone(),
            rpc_url,
            username: config.username.clone().filter(|u| !u.is_empty()),
            password: config.password.clone(),
            client,
            session_id: RwLock::new(None),
        })
    }

    /// Call an RPC method, repeating once if the server hands out a new
    /// session id.
    async fn call<A, T>(&self, method: &str, arguments: A) -> Result<Option<T>, DownloaderError>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let request = RpcRequest { method, arguments };

        for _ in 0..2 {
            let mut builder = self.client.post(&self.rpc_url).json(&request);
            let session_id = self.session_id.read().clone();
            if let Some(session_id) = session_id {
                builder = builder.header(SESSION_HEADER, session_id);
            }
            if let Some(username) = &self.username {
                builder = builder.basic_auth(username, self.password.as_deref());
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| DownloaderError::http(&self.id, e))?;

            match resp.status() {
                StatusCode::CONFLICT => {
                    let session_id = resp
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    match session_id {
                        Some(session_id) => {
                            debug!(downloader = %self.id, "Transmission session id refreshed");
                            *self.session_id.write() = Some(session_id);
                            continue;
                        }
                        None => return Err(DownloaderError::status(&self.id, resp.status())),
                    }
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(DownloaderError::Auth {
                        client: self.id.clone(),
                        reason: "invalid username or password".to_string(),
                    });
                }
                status if !status.is_success() => {
                    return Err(DownloaderError::status(&self.id, status));
                }
                _ => {}
            }

            let body: RpcResponse<T> = resp
                .json()
                .await
                .map_err(|e| DownloaderError::http(&self.id, e))?;
            if body.result != "success" {
                return Err(DownloaderError::Rejected {
                    client: self.id.clone(),
                    message: body.result,
                });
            }
            return Ok(body.arguments);
        }

        Err(DownloaderError::Status {
            client: self.id.clone(),
            status: StatusCode::CONFLICT.as_u16(),
        })
    }
}

#[async_trait]
impl Downloader for TransmissionClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DownloaderKind {
        DownloaderKind::Transmission
    }

    async fn completed_torrents(&self) -> Result<Vec<Torrent>, DownloaderError> {
        let result: Option<TorrentGetResult> = self
            .call(
                "torrent-get",
                TorrentGetArgs {
                    fields: TORRENT_FIELDS,
                },
            )
            .await?;

        Ok(result
            .map(|r| r.torrents)
            .unwrap_or_default()
            .into_iter()
            .filter(TrTorrent::is_completed)
            .map(Torrent::Transmission)
            .collect())
    }

    async fn set_tags(&self, hash: &str, tags: &[String]) -> Result<(), DownloaderError> {
        let _: Option<serde_json::Value> = self
            .call(
                "torrent-set",
                TorrentSetArgs {
                    ids: [hash],
                    labels: tags,
                },
            )
            .await?;
        Ok(())
    }
}
