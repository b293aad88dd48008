//! Downloader access, classification and the marking service

pub mod classifier;
pub mod downloader;
pub mod manager;
pub mod ocr;
pub mod torrent_mark;

pub use classifier::{Classifier, Label};
pub use downloader::{Downloader, DownloaderGateway, DownloaderKind, Torrent};
pub use manager::{Service, ServiceHealth};
pub use ocr::{CaptchaRequest, OcrClient};
pub use torrent_mark::{MarkState, TorrentMarkService};
