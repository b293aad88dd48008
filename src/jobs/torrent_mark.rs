//! PT/BT marking job
//!
//! One pass walks the configured downloaders in order, classifies every
//! completed torrent and writes the merged tag set back:
//! 1. Fetch completed torrents (an unreachable client counts as "none")
//! 2. Check for cancellation before each torrent
//! 3. Read hash and tags, classify, merge the label into the tags
//! 4. Write the tags back (a failed write is logged and skipped)
//!
//! The pass is sequential: torrents are tagged in listing order, and a slow
//! client delays the ones after it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MarkSettings;
use crate::services::classifier::{Classifier, Label};
use crate::services::downloader::{DownloaderGateway, Torrent};

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub downloaders: usize,
    pub torrents: usize,
    pub tagged_pt: usize,
    pub tagged_bt: usize,
    pub failed_writes: usize,
    pub skipped: usize,
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Marking is disabled or no downloader is selected.
    NotConfigured,
    Completed(PassStats),
    Cancelled(PassStats),
}

impl PassOutcome {
    pub fn stats(&self) -> Option<&PassStats> {
        match self {
            PassOutcome::NotConfigured => None,
            PassOutcome::Completed(stats) | PassOutcome::Cancelled(stats) => Some(stats),
        }
    }
}

/// Merge a label into an existing tag set.
///
/// Existing tags are kept as they are; the label is appended only when
/// missing, so repeated passes leave the tags unchanged.
pub fn merge_label(mut tags: Vec<String>, label: Label) -> Vec<String> {
    if !tags.iter().any(|t| t == label.as_str()) {
        tags.push(label.as_str().to_string());
    }
    tags
}

pub struct MarkJob {
    gateway: Arc<DownloaderGateway>,
}

impl MarkJob {
    pub fn new(gateway: Arc<DownloaderGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &DownloaderGateway {
        &self.gateway
    }

    /// Run one pass over `settings.downloaders`.
    pub async fn run(&self, settings: &MarkSettings, cancel: &CancellationToken) -> PassOutcome {
        if !settings.enabled || settings.downloaders.is_empty() {
            warn!(job = "torrent_mark", "Torrent marking is disabled or has no downloaders selected");
            return PassOutcome::NotConfigured;
        }

        let classifier = Classifier::with_extra_markers(&settings.private_markers);
        let mut stats = PassStats::default();

        for downloader in &settings.downloaders {
            if cancel.is_cancelled() {
                info!(job = "torrent_mark", "Torrent marking stopped");
                return PassOutcome::Cancelled(stats);
            }

            let Some(kind) = self.gateway.kind(downloader) else {
                warn!(
                    job = "torrent_mark",
                    downloader = %downloader,
                    "Downloader not registered, skipping"
                );
                continue;
            };
            info!(job = "torrent_mark", downloader = %downloader, kind = %kind, "Scanning downloader");
            stats.downloaders += 1;

            let torrents = match self.gateway.list_completed(downloader).await {
                Ok(torrents) => torrents,
                Err(e) => {
                    warn!(
                        job = "torrent_mark",
                        downloader = %downloader,
                        error = %e,
                        "Could not list completed torrents"
                    );
                    Vec::new()
                }
            };

            if torrents.is_empty() {
                info!(job = "torrent_mark", downloader = %downloader, "No completed torrents");
                continue;
            }
            info!(
                job = "torrent_mark",
                downloader = %downloader,
                torrent_count = torrents.len(),
                "Completed torrents found"
            );

            for torrent in &torrents {
                if cancel.is_cancelled() {
                    info!(job = "torrent_mark", "Torrent marking stopped");
                    return PassOutcome::Cancelled(stats);
                }
                self.mark_torrent(downloader, torrent, &classifier, &mut stats)
                    .await;
            }
        }

        info!(
            job = "torrent_mark",
            downloaders = stats.downloaders,
            torrents = stats.torrents,
            pt = stats.tagged_pt,
            bt = stats.tagged_bt,
            failed = stats.failed_writes,
            "Torrent marking complete"
        );
        PassOutcome::Completed(stats)
    }

    async fn mark_torrent(
        &self,
        downloader: &str,
        torrent: &Torrent,
        classifier: &Classifier,
        stats: &mut PassStats,
    ) {
        stats.torrents += 1;

        let hash = match torrent.identifier() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(
                    job = "torrent_mark",
                    downloader = %downloader,
                    torrent_name = %torrent.name(),
                    error = %e,
                    "Skipping torrent without an identifier"
                );
                stats.skipped += 1;
                return;
            }
        };

        let tags = torrent.tags().unwrap_or_else(|e| {
            debug!(job = "torrent_mark", info_hash = %hash, error = %e, "Treating tags as empty");
            Vec::new()
        });
        let label = classifier.classify(torrent).unwrap_or_else(|e| {
            debug!(job = "torrent_mark", info_hash = %hash, error = %e, "Defaulting to BT");
            Label::Bt
        });

        let merged = merge_label(tags, label);
        match self.gateway.set_tags(downloader, hash, &merged).await {
            Ok(()) => {
                debug!(
                    job = "torrent_mark",
                    downloader = %downloader,
                    info_hash = %hash,
                    label = %label,
                    "Torrent tagged"
                );
                match label {
                    Label::Pt => stats.tagged_pt += 1,
                    Label::Bt => stats.tagged_bt += 1,
                }
            }
            Err(e) => {
                warn!(
                    job = "torrent_mark",
                    downloader = %downloader,
                    info_hash = %hash,
                    torrent_name = %torrent.name(),
                    error = %e,
                    "Failed to write torrent tags"
                );
                stats.failed_writes += 1;
            }
        }
    }
}
