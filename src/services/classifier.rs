//! PT/BT classification from tracker URLs.
//!
//! A torrent announced to exactly one tracker whose URL carries a
//! per-user credential (`passkey=`, `secure=`) or a known closed-tracker
//! domain is private. Everything else, including torrents with several
//! trackers, is treated as public.

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::services::downloader::Torrent;

/// Tracker URL substrings that identify a private tracker.
pub const DEFAULT_PRIVATE_MARKERS: &[&str] = &["secure=", "passkey=", "totheglory"];

/// Label applied to a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "PT")]
    Pt,
    #[serde(rename = "BT")]
    Bt,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Pt => "PT",
            Label::Bt => "BT",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    markers: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            markers: DEFAULT_PRIVATE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Classifier {
    /// Built-in markers plus extra closed-tracker substrings.
    pub fn with_extra_markers<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut classifier = Self::default();
        for marker in extra.iter().map(|m| m.as_ref().trim()) {
            if !marker.is_empty() && !classifier.markers.iter().any(|m| m == marker) {
                classifier.markers.push(marker.to_string());
            }
        }
        classifier
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Label for a list of tracker URLs.
    pub fn classify_trackers(&self, trackers: &[&str]) -> Label {
        match trackers {
            [tracker] if self.markers.iter().any(|m| tracker.contains(m.as_str())) => Label::Pt,
            _ => Label::Bt,
        }
    }

    /// Whether the torrent has a single tracker carrying a private marker.
    pub fn is_single_tracker_private(&self, torrent: &Torrent) -> Result<bool, ExtractError> {
        Ok(self.classify(torrent)? == Label::Pt)
    }

    pub fn classify(&self, torrent: &Torrent) -> Result<Label, ExtractError> {
        Ok(self.classify_trackers(&torrent.trackers()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::downloader::test_support::{qb_torrent, tr_torrent};
    use crate::services::downloader::{QbTorrent, Torrent};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_tracker_markers() {
        let classifier = Classifier::default();
        assert_eq!(
            classifier.classify_trackers(&["https://pt.example/announce.php?passkey=abc"]),
            Label::Pt
        );
        assert_eq!(
            classifier.classify_trackers(&["https://pt.example/announce?secure=xyz"]),
            Label::Pt
        );
        assert_eq!(
            classifier.classify_trackers(&["https://totheglory.im/announce/deadbeef"]),
            Label::Pt
        );
        assert_eq!(
            classifier.classify_trackers(&["udp://tracker.opentrackr.org:1337/announce"]),
            Label::Bt
        );
    }

    #[test]
    fn test_zero_or_many_trackers_are_bt() {
        let classifier = Classifier::default();
        assert_eq!(classifier.classify_trackers(&[]), Label::Bt);
        // Multi-tracker private torrents also land here.
        assert_eq!(
            classifier.classify_trackers(&[
                "https://pt.example/announce?passkey=abc",
                "https://backup.pt.example/announce?passkey=abc",
            ]),
            Label::Bt
        );
    }

    #[test]
    fn test_mixed_client_scenario() {
        let classifier = Classifier::default();
        let torrents = [
            tr_torrent("a", &[], &["https://pt.example/announce?passkey=abc"]),
            tr_torrent("b", &[], &["udp://one:80", "udp://two:80"]),
            tr_torrent("c", &[], &[]),
        ];
        let labels: Vec<Label> = torrents
            .iter()
            .map(|t| classifier.classify(t).unwrap())
            .collect();
        assert_eq!(labels, vec![Label::Pt, Label::Bt, Label::Bt]);
    }

    #[test]
    fn test_qbittorrent_multi_tracker_count_is_bt() {
        let classifier = Classifier::default();
        // The reported tracker has a passkey, but the torrent has three trackers.
        let torrent = Torrent::QBittorrent(QbTorrent {
            hash: Some("a".to_string()),
            tracker: Some("https://pt.example/announce?passkey=abc".to_string()),
            trackers_count: Some(3),
            ..Default::default()
        });
        assert_eq!(classifier.classify(&torrent).unwrap(), Label::Bt);
        assert!(!classifier.is_single_tracker_private(&torrent).unwrap());

        let single = qb_torrent("b", "", &["https://pt.example/announce?passkey=abc"]);
        assert!(classifier.is_single_tracker_private(&single).unwrap());
    }

    #[test]
    fn test_missing_tracker_info_is_an_error() {
        let classifier = Classifier::default();
        let torrent = Torrent::QBittorrent(QbTorrent::default());
        assert!(classifier.classify(&torrent).is_err());
    }

    #[test]
    fn test_extra_markers() {
        let classifier = Classifier::with_extra_markers(&["hdsky.me", " ", "passkey="]);
        assert_eq!(classifier.markers().len(), DEFAULT_PRIVATE_MARKERS.len() + 1);
        assert_eq!(
            classifier.classify_trackers(&["https://hdsky.me/announce.php"]),
            Label::Pt
        );
        assert_eq!(
            Classifier::default().classify_trackers(&["https://hdsky.me/announce.php"]),
            Label::Bt
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = Classifier::default();
        let torrent = qb_torrent("a", "", &["https://pt.example/announce?secure=1"]);
        let first = classifier.classify(&torrent).unwrap();
        for _ in 0..10 {
            assert_eq!(classifier.classify(&torrent).unwrap(), first);
        }
    }

    #[test]
    fn test_label_strings() {
        assert_eq!(Label::Pt.to_string(), "PT");
        assert_eq!(Label::Bt.as_str(), "BT");
    }
}
