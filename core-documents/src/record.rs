//! File status records reported to the host

use bridge_traits::ubiquity::{
    DOWNLOADING_STATUS_CURRENT, DOWNLOADING_STATUS_DOWNLOADED, DOWNLOADING_STATUS_NOT_DOWNLOADED,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local availability of a cloud file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    /// Only in the cloud
    NotDownloaded,
    /// A local copy exists but may be stale
    Downloaded,
    /// The local copy is up to date
    Current,
}

impl DownloadStatus {
    /// Map the platform's raw downloading status
    pub fn from_platform(raw: &str) -> Option<Self> {
        match raw {
            DOWNLOADING_STATUS_NOT_DOWNLOADED => Some(DownloadStatus::NotDownloaded),
            DOWNLOADING_STATUS_DOWNLOADED => Some(DownloadStatus::Downloaded),
            DOWNLOADING_STATUS_CURRENT => Some(DownloadStatus::Current),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::NotDownloaded => "notDownloaded",
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Current => "current",
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync status of one file inside a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusRecord {
    /// Path below the container root, without a leading separator
    pub relative_path: String,
    pub size_in_bytes: u64,
    pub creation_date: DateTime<Utc>,
    pub content_change_date: DateTime<Utc>,
    pub has_unresolved_conflicts: bool,
    pub download_status: DownloadStatus,
    pub is_downloading: bool,
    pub is_uploaded: bool,
    pub is_uploading: bool,
}
