//! Download job and its state machine.

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::{IndexerId, JobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DownloadStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Running => "running",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
            DownloadStatus::Paused => "paused",
        }
    }

    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DownloadStatus::Queued),
            "running" => Ok(DownloadStatus::Running),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            "cancelled" => Ok(DownloadStatus::Cancelled),
            "paused" => Ok(DownloadStatus::Paused),
            other => Err(format!("unknown download status: {other}")),
        }
    }
}

/// A single download job as tracked by the Download Scheduler. The
/// scheduler is the sole writer of every field here; see
/// `foliofox_core::scheduler` for the state transition guard.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DownloadJob {
    pub id: JobId,
    pub user_id: UserId,
    pub indexer_id: IndexerId,
    pub download_url: String,
    pub title: String,
    pub format: String,
    pub file_size_bytes: Option<u64>,
    pub priority: i32,
    pub status: DownloadStatus,
    pub attempts: u32,
    #[cfg(feature = "chrono")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub started_at: Option<DateTime<Utc>>,
    #[cfg(feature = "chrono")]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub bytes_downloaded: u64,
    pub speed_bps: f64,
    pub eta_seconds: Option<u64>,
    pub target_path: String,
}

impl DownloadJob {
    pub fn new(
        user_id: UserId,
        indexer_id: IndexerId,
        download_url: String,
        title: String,
        format: String,
        file_size_bytes: Option<u64>,
        priority: i32,
        target_path: String,
    ) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            indexer_id,
            download_url,
            title,
            format,
            file_size_bytes,
            priority,
            status: DownloadStatus::Queued,
            attempts: 0,
            #[cfg(feature = "chrono")]
            next_retry_at: None,
            #[cfg(feature = "chrono")]
            created_at: Utc::now(),
            #[cfg(feature = "chrono")]
            started_at: None,
            #[cfg(feature = "chrono")]
            completed_at: None,
            last_error: None,
            bytes_downloaded: 0,
            speed_bps: 0.0,
            eta_seconds: None,
            target_path,
        }
    }

    /// Whether the user can retry this job from the UI.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.status == DownloadStatus::Failed && self.attempts < max_retries
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DownloadHistoryEntry {
    pub job_id: JobId,
    pub final_status: DownloadStatus,
    pub attempts: u32,
    pub total_bytes: u64,
    pub duration_ms: u64,
    #[cfg(feature = "chrono")]
    pub finished_at: DateTime<Utc>,
}
