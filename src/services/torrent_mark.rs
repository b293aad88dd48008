//! Torrent marking service.
//!
//! Implements [Service](crate::services::manager::Service). Owns the current
//! [MarkSettings] and the [MarkScheduler] built from them. Every
//! [configure](TorrentMarkService::configure) tears the previous scheduler down
//! (cancelling a running pass and waiting for it) before a new one is built, so
//! at most one recurring trigger exists at any time.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{ConfigStore, MarkSettings};
use crate::jobs::{MarkJob, MarkScheduler};
use crate::services::manager::{Service, ServiceHealth};

/// Lifecycle state of the marking schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkState {
    /// No recurring trigger registered.
    Stopped,
    /// Recurring trigger registered, no pass running.
    Scheduled,
    /// A pass is executing.
    Running,
}

#[derive(Default)]
struct Controller {
    settings: MarkSettings,
    scheduler: Option<MarkScheduler>,
}

pub struct TorrentMarkService {
    job: Arc<MarkJob>,
    store: Arc<dyn ConfigStore>,
    inner: Mutex<Controller>,
}

impl TorrentMarkService {
    /// Create the service. Nothing is scheduled until [Service::start] or
    /// [configure](Self::configure) is called.
    pub fn new(job: Arc<MarkJob>, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            job,
            store,
            inner: Mutex::new(Controller::default()),
        }
    }

    /// Apply a new configuration.
    ///
    /// An invalid cron expression is rejected before anything is torn down.
    /// When `run_once` is set, a one-shot pass is queued and the flag is
    /// cleared and persisted straight away.
    pub async fn configure(&self, settings: MarkSettings) -> Result<()> {
        let schedule = settings.job_schedule()?;
        if let Some(schedule) = &schedule {
            MarkScheduler::check_schedule(schedule)?;
        }

        let mut inner = self.inner.lock().await;
        if let Some(previous) = inner.scheduler.take() {
            info!(service = "torrent_mark", "Stopping previous schedule");
            previous.shutdown().await;
        }

        let mut settings = settings;
        let run_once = settings.run_once;
        settings.run_once = false;
        // The recurring trigger only makes sense with marking fully configured.
        let schedule = schedule.filter(|_| settings.is_active());

        if schedule.is_none() && !run_once {
            if settings.enabled {
                warn!(
                    service = "torrent_mark",
                    "Torrent marking enabled but cron or downloaders are missing"
                );
            }
            info!(service = "torrent_mark", "Torrent marking not scheduled");
            inner.settings = settings;
            return Ok(());
        }

        let scheduler = MarkScheduler::start(
            self.job.clone(),
            Arc::new(settings.clone()),
            schedule.as_deref(),
            run_once,
        )
        .await?;

        if let Some(cron) = settings.cron().filter(|_| scheduler.recurring_job().is_some()) {
            info!(service = "torrent_mark", cron = %cron, "Torrent marking scheduled");
        }
        if run_once {
            info!(service = "torrent_mark", "Torrent marking queued to run once");
            if let Err(e) = self.store.save_mark_settings(&settings).await {
                warn!(service = "torrent_mark", error = %e, "Failed to persist cleared run-once flag");
            }
        }

        inner.settings = settings;
        inner.scheduler = Some(scheduler);
        Ok(())
    }

    /// Current configuration (with the run-once flag already consumed).
    pub async fn settings(&self) -> MarkSettings {
        self.inner.lock().await.settings.clone()
    }

    pub async fn state(&self) -> MarkState {
        let inner = self.inner.lock().await;
        match &inner.scheduler {
            Some(s) if s.is_running() => MarkState::Running,
            Some(s) if s.recurring_job().is_some() => MarkState::Scheduled,
            _ => MarkState::Stopped,
        }
    }

    /// Number of recurring triggers currently registered (0 or 1).
    pub async fn recurring_triggers(&self) -> usize {
        self.inner
            .lock()
            .await
            .scheduler
            .as_ref()
            .and_then(MarkScheduler::recurring_job)
            .map_or(0, |_| 1)
    }
}

#[async_trait]
impl Service for TorrentMarkService {
    fn name(&self) -> &str {
        "torrent_mark"
    }

    async fn start(&self) -> Result<()> {
        let settings = self.store.load().await?.torrent_mark;
        self.configure(settings).await?;
        info!(service = "torrent_mark", "Torrent mark service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!(service = "torrent_mark", "Torrent mark service stopping");
        let previous = self.inner.lock().await.scheduler.take();
        if let Some(scheduler) = previous {
            scheduler.shutdown().await;
        }
        info!(service = "torrent_mark", "Torrent mark service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        let settings = self.settings().await;
        if settings.is_active() && self.recurring_triggers().await == 0 {
            return Ok(ServiceHealth::degraded("marking enabled but not scheduled"));
        }
        Ok(ServiceHealth::healthy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use crate::services::downloader::DownloaderGateway;
    use pretty_assertions::assert_eq;

    fn service() -> (TorrentMarkService, Arc<MemoryConfigStore>) {
        let store = Arc::new(MemoryConfigStore::default());
        let job = Arc::new(MarkJob::new(Arc::new(DownloaderGateway::new())));
        (TorrentMarkService::new(job, store.clone()), store)
    }

    fn active() -> MarkSettings {
        MarkSettings {
            enabled: true,
            cron: Some("0 3 * * *".to_string()),
            run_once: false,
            downloaders: vec!["qb".to_string()],
            private_markers: Vec::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconfigure_keeps_single_recurring_trigger() {
        let (service, _) = service();
        service.configure(active()).await.unwrap();
        service.configure(active()).await.unwrap();

        assert_eq!(service.recurring_triggers().await, 1);
        assert_eq!(service.state().await, MarkState::Scheduled);

        service.stop().await.unwrap();
        assert_eq!(service.recurring_triggers().await, 0);
        assert_eq!(service.state().await, MarkState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_keeps_previous_schedule() {
        let (service, _) = service();
        service.configure(active()).await.unwrap();

        let mut bad = active();
        bad.cron = Some("every day".to_string());
        assert!(service.configure(bad).await.is_err());

        assert_eq!(service.recurring_triggers().await, 1);
        assert_eq!(service.settings().await, active());
        service.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_out_of_range_cron_keeps_previous_schedule() {
        let (service, _) = service();
        service.configure(active()).await.unwrap();

        let mut bad = active();
        bad.cron = Some("99 * * * *".to_string());
        assert!(service.configure(bad).await.is_err());

        assert_eq!(service.recurring_triggers().await, 1);
        assert_eq!(service.state().await, MarkState::Scheduled);
        assert_eq!(service.settings().await, active());
        assert_eq!(service.health().await.unwrap(), ServiceHealth::healthy());
        service.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disabled_configuration_stops_schedule() {
        let (service, _) = service();
        service.configure(active()).await.unwrap();

        let mut disabled = active();
        disabled.enabled = false;
        service.configure(disabled).await.unwrap();

        assert_eq!(service.recurring_triggers().await, 0);
        assert_eq!(service.state().await, MarkState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_once_flag_is_consumed_and_persisted() {
        let (service, store) = service();
        let mut once = active();
        once.cron = None;
        once.run_once = true;

        service.configure(once).await.unwrap();

        assert!(!service.settings().await.run_once);
        assert!(!store.snapshot().torrent_mark.run_once);
        assert_eq!(service.recurring_triggers().await, 0);
        service.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_applies_stored_settings() {
        let (service, store) = service();
        store.save_mark_settings(&active()).await.unwrap();

        service.start().await.unwrap();
        assert_eq!(service.state().await, MarkState::Scheduled);
        assert_eq!(service.health().await.unwrap(), ServiceHealth::healthy());

        service.stop().await.unwrap();
        // Stopping twice is harmless.
        service.stop().await.unwrap();
    }
}
