//! Error types shared by the downloader gateway, the classifier and configuration.

use thiserror::Error;

/// Failure talking to a torrent client.
#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("downloader '{0}' is not configured or not enabled")]
    UnknownClient(String),

    #[error("authentication with downloader '{client}' failed: {reason}")]
    Auth { client: String, reason: String },

    #[error("request to downloader '{client}' failed: {source}")]
    Http {
        client: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("downloader '{client}' answered with unexpected status {status}")]
    Status { client: String, status: u16 },

    #[error("downloader '{client}' rejected the request: {message}")]
    Rejected { client: String, message: String },
}

impl DownloaderError {
    pub(crate) fn http(client: &str, source: reqwest::Error) -> Self {
        Self::Http {
            client: client.to_string(),
            source,
        }
    }

    pub(crate) fn status(client: &str, status: reqwest::StatusCode) -> Self {
        Self::Status {
            client: client.to_string(),
            status: status.as_u16(),
        }
    }
}

/// A field the client was expected to report is missing from a torrent record.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("torrent record has no {0}")]
    MissingField(&'static str),
}

/// Invalid values in the settings document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cron expression '{0}' must have 5 fields (minute hour day-of-month month day-of-week)")]
    InvalidCron(String),

    #[error("unknown downloader kind '{0}'")]
    UnknownKind(String),
}
