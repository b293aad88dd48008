//! Torrentmark - labels completed torrents as PT or BT
//!
//! Periodically scans qBittorrent and Transmission clients, classifies every
//! completed torrent by its tracker URL and writes a `PT` or `BT` tag back to
//! the client.

pub mod config;
pub mod error;
pub mod jobs;
pub mod services;
