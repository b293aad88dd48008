//! Integration tests for the marking pipeline
//!
//! These drive [TorrentMarkService] end to end against an in-memory downloader:
//! - one-shot passes fired by the scheduler
//! - run-once flag consumption
//! - stopping the service while a pass is running

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use torrentmark::config::{MarkSettings, MemoryConfigStore};
use torrentmark::error::DownloaderError;
use torrentmark::jobs::MarkJob;
use torrentmark::services::downloader::{TrTorrent, TrTracker};
use torrentmark::services::{
    Downloader, DownloaderGateway, DownloaderKind, MarkState, Service, Torrent,
    TorrentMarkService,
};

// ============================================================================
// In-memory downloader
// ============================================================================

struct MemoryDownloader {
    torrents: Vec<Torrent>,
    writes: Mutex<Vec<(String, Vec<String>)>>,
    write_delay: Duration,
}

impl MemoryDownloader {
    fn new(torrents: Vec<Torrent>, write_delay: Duration) -> Self {
        Self {
            torrents,
            writes: Mutex::new(Vec::new()),
            write_delay,
        }
    }

    fn writes(&self) -> Vec<(String, Vec<String>)> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl Downloader for MemoryDownloader {
    fn id(&self) -> &str {
        "tr"
    }

    fn kind(&self) -> DownloaderKind {
        DownloaderKind::Transmission
    }

    async fn completed_torrents(&self) -> Result<Vec<Torrent>, DownloaderError> {
        Ok(self.torrents.clone())
    }

    async fn set_tags(&self, hash: &str, tags: &[String]) -> Result<(), DownloaderError> {
        tokio::time::sleep(self.write_delay).await;
        self.writes.lock().push((hash.to_string(), tags.to_vec()));
        Ok(())
    }
}

fn torrent(hash: &str, trackers: &[&str]) -> Torrent {
    Torrent::Transmission(TrTorrent {
        hash_string: Some(hash.to_string()),
        name: Some(hash.to_string()),
        labels: Some(Vec::new()),
        trackers: Some(
            trackers
                .iter()
                .map(|t| TrTracker {
                    announce: t.to_string(),
                })
                .collect(),
        ),
        status: Some(6),
    })
}

fn run_once_settings() -> MarkSettings {
    MarkSettings {
        enabled: true,
        cron: None,
        run_once: true,
        downloaders: vec!["tr".to_string()],
        private_markers: Vec::new(),
    }
}

fn service_with(
    downloader: Arc<MemoryDownloader>,
) -> (TorrentMarkService, Arc<MemoryConfigStore>) {
    let mut gateway = DownloaderGateway::new();
    gateway.register(downloader);
    let store = Arc::new(MemoryConfigStore::default());
    let job = Arc::new(MarkJob::new(Arc::new(gateway)));
    (TorrentMarkService::new(job, store.clone()), store)
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn run_once_labels_completed_torrents() {
    let downloader = Arc::new(MemoryDownloader::new(
        vec![
            torrent("a", &["https://pt.example/announce.php?passkey=abc"]),
            torrent("b", &["udp://one:80/announce", "udp://two:80/announce"]),
            torrent("c", &[]),
        ],
        Duration::ZERO,
    ));
    let (service, store) = service_with(downloader.clone());

    service.configure(run_once_settings()).await.unwrap();
    assert!(!store.snapshot().torrent_mark.run_once);

    wait_for(|| downloader.writes().len() == 3).await;
    let labels: Vec<(String, Vec<String>)> = downloader.writes();
    assert_eq!(
        labels,
        vec![
            ("a".to_string(), vec!["PT".to_string()]),
            ("b".to_string(), vec!["BT".to_string()]),
            ("c".to_string(), vec!["BT".to_string()]),
        ]
    );

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_cancels_running_pass() {
    let torrents = (0..20).map(|i| torrent(&format!("t{i}"), &[])).collect();
    let downloader = Arc::new(MemoryDownloader::new(
        torrents,
        Duration::from_millis(100),
    ));
    let (service, _) = service_with(downloader.clone());

    service.configure(run_once_settings()).await.unwrap();
    wait_for(|| !downloader.writes().is_empty()).await;
    assert_eq!(service.state().await, MarkState::Running);

    service.stop().await.unwrap();
    let after_stop = downloader.writes().len();
    assert!(after_stop < 20, "pass should have been cancelled");
    assert_eq!(service.state().await, MarkState::Stopped);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(downloader.writes().len(), after_stop);
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_run_once_writes_nothing() {
    let downloader = Arc::new(MemoryDownloader::new(
        vec![torrent("a", &[])],
        Duration::ZERO,
    ));
    let (service, store) = service_with(downloader.clone());

    let mut settings = run_once_settings();
    settings.enabled = false;
    service.configure(settings).await.unwrap();
    assert!(!store.snapshot().torrent_mark.run_once);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(downloader.writes().is_empty());
    service.stop().await.unwrap();
}
