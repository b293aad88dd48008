//! Lifecycle contract for long-running services.
//!
//! The host process starts every [Service] it owns once configuration is
//! loaded and stops them on shutdown. Background schedules, cancellation and
//! persisted state all hang off [start](Service::start) and [stop](Service::stop).

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Result of a service health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }
}

/// A component with background work the host starts and stops.
///
/// Log lifecycle transitions with [tracing] at `info`, tagged with the service
/// name (`tracing::info!(service = "torrent_mark", "Started")`), and failures at
/// `warn`/`error`. Both `start` and `stop` may be called repeatedly.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Name used in logs (e.g. "torrent_mark").
    fn name(&self) -> &str;

    /// Load configuration and register background work.
    async fn start(&self) -> Result<()>;

    /// Tear down background work, waiting for in-flight work to exit.
    async fn stop(&self) -> Result<()>;

    /// Stop then start, picking up configuration changes from the store.
    async fn restart(&self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    async fn health(&self) -> Result<ServiceHealth> {
        Ok(ServiceHealth::healthy())
    }
}
