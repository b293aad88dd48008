//! Background job scheduling
//!
//! A [MarkScheduler] owns one `tokio-cron-scheduler` instance with at most one
//! recurring trigger and at most one one-shot trigger. Every scheduler has its
//! own cancellation token; stopping it cancels the token, waits for a running
//! pass to notice and exit, then drops the scheduler. The next scheduler starts
//! with a fresh token.

pub mod torrent_mark;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MarkSettings;

pub use torrent_mark::{MarkJob, PassOutcome, PassStats, merge_label};

/// What fired a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Cron,
    Once,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Cron => write!(f, "cron"),
            Trigger::Once => write!(f, "once"),
        }
    }
}

/// Everything a firing needs; cloned into each trigger closure.
#[derive(Clone)]
struct PassContext {
    job: Arc<MarkJob>,
    settings: Arc<MarkSettings>,
    cancel: CancellationToken,
    pass_lock: Arc<Mutex<()>>,
}

impl PassContext {
    async fn fire(self, trigger: Trigger) {
        // Only one pass at a time; overlapping firings are dropped.
        let Ok(_guard) = self.pass_lock.clone().try_lock_owned() else {
            warn!(job = "torrent_mark", trigger = %trigger, "Previous pass still running, skipping");
            return;
        };
        if self.cancel.is_cancelled() {
            debug!(job = "torrent_mark", trigger = %trigger, "Scheduler stopping, pass not started");
            return;
        }

        info!(job = "torrent_mark", trigger = %trigger, "Running torrent marking");
        let job = self.job.clone();
        let settings = self.settings.clone();
        let cancel = self.cancel.clone();
        // A panic inside the pass ends only this task; the trigger stays registered.
        let handle = tokio::spawn(async move { job.run(&settings, &cancel).await });
        match handle.await {
            Ok(outcome) => debug!(job = "torrent_mark", trigger = %trigger, outcome = ?outcome, "Pass finished"),
            Err(e) => error!(job = "torrent_mark", trigger = %trigger, error = %e, "Pass aborted"),
        }
    }
}

/// A running scheduler for one configuration.
pub struct MarkScheduler {
    scheduler: JobScheduler,
    recurring: Option<Uuid>,
    once: Option<Uuid>,
    cancel: CancellationToken,
    pass_lock: Arc<Mutex<()>>,
}

impl MarkScheduler {
    /// Register the triggers described by `settings` and start ticking.
    ///
    /// `schedule` is the 6-field scheduler expression for the recurring
    /// trigger; `run_once` adds a trigger that fires immediately.
    pub async fn start(
        job: Arc<MarkJob>,
        settings: Arc<MarkSettings>,
        schedule: Option<&str>,
        run_once: bool,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let ctx = PassContext {
            job,
            settings,
            cancel: CancellationToken::new(),
            pass_lock: Arc::new(Mutex::new(())),
        };

        let recurring = match schedule {
            Some(schedule) => {
                let cron_ctx = ctx.clone();
                let cron_job = Job::new_async_tz(schedule, Local, move |_uuid, _l| {
                    let ctx = cron_ctx.clone();
                    Box::pin(async move { ctx.fire(Trigger::Cron).await })
                })?;
                let id = scheduler.add(cron_job).await?;
                info!(job = "torrent_mark", schedule = %schedule, "Recurring trigger registered");
                Some(id)
            }
            None => None,
        };

        let once = if run_once {
            let once_ctx = ctx.clone();
            let once_job = Job::new_one_shot_async(Duration::ZERO, move |_uuid, _l| {
                let ctx = once_ctx.clone();
                Box::pin(async move { ctx.fire(Trigger::Once).await })
            })?;
            let id = scheduler.add(once_job).await?;
            info!(job = "torrent_mark", "One-shot trigger registered");
            Some(id)
        } else {
            None
        };

        scheduler.start().await?;
        debug!(job = "torrent_mark", "Job scheduler started");

        Ok(Self {
            scheduler,
            recurring,
            once,
            cancel: ctx.cancel,
            pass_lock: ctx.pass_lock,
        })
    }

    /// Parse a 6-field scheduler expression without registering anything.
    pub fn check_schedule(schedule: &str) -> Result<()> {
        Job::new_async_tz(schedule, Local, |_uuid, _l| Box::pin(async {}))?;
        Ok(())
    }

    pub fn recurring_job(&self) -> Option<Uuid> {
        self.recurring
    }

    pub fn one_shot_job(&self) -> Option<Uuid> {
        self.once
    }

    /// Whether a pass is executing right now.
    pub fn is_running(&self) -> bool {
        self.pass_lock.try_lock().is_err()
    }

    /// Stop ticking, cancel a running pass and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = self.scheduler.shutdown().await {
            warn!(job = "torrent_mark", error = %e, "Job scheduler did not shut down cleanly");
        }
        let _idle = self.pass_lock.lock().await;
        debug!(job = "torrent_mark", "Job scheduler stopped");
    }
}
