//! Torrentmark host process
//!
//! Loads the settings document, registers the enabled downloaders and runs the
//! marking service until Ctrl-C. With `--captcha URL` it only runs the OCR
//! helper on one image.

mod cli;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use torrentmark::config::{Config, ConfigStore, JsonFileStore};
use torrentmark::jobs::MarkJob;
use torrentmark::services::{
    CaptchaRequest, DownloaderGateway, OcrClient, Service, TorrentMarkService,
};

use crate::cli::CliOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let options = CliOptions::from_args();
    let mut config = Config::from_env()?;
    if let Some(path) = options.config_path {
        config.settings_path = path;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "torrentmark=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Torrentmark");

    let store = Arc::new(JsonFileStore::new(&config.settings_path));
    tracing::info!(path = %store.path().display(), "Loading settings");
    let settings = store.load().await?;

    let ocr = OcrClient::new(
        config
            .ocr_server_host
            .as_deref()
            .or(settings.ocr_server_host.as_deref()),
    );
    if let Some(image_url) = options.captcha_url {
        match ocr.endpoint() {
            Some(endpoint) => tracing::info!(endpoint = %endpoint, "Recognising captcha"),
            None => tracing::warn!("OCR_SERVER_HOST is not configured, captcha text will be empty"),
        }
        let request = CaptchaRequest {
            image_url: Some(image_url),
            ..Default::default()
        };
        println!("{}", ocr.captcha_text(&request).await);
        return Ok(());
    }

    let gateway = DownloaderGateway::from_configs(&settings.downloaders, config.downloader_timeout)?;
    if gateway.is_empty() {
        tracing::warn!("No enabled downloaders configured");
    }

    let job = Arc::new(MarkJob::new(Arc::new(gateway)));
    let service = TorrentMarkService::new(job, store.clone());
    service.start().await?;

    if options.run_once {
        let mut once = service.settings().await;
        once.run_once = true;
        service.configure(once).await?;
    }

    tracing::info!(state = ?service.state().await, "Torrent mark service running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    service.stop().await?;

    Ok(())
}
