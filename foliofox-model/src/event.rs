//! Event Bus envelope and typed payloads.

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::download::DownloadStatus;
use crate::ids::{IndexerId, JobId, UserId};
use crate::indexer::IndexerStatus;

/// One of the WebSocket event types clients can receive.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum EventKind {
    DownloadProgressUpdate {
        job_id: JobId,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        speed_bps: f64,
        eta_seconds: Option<u64>,
    },
    DownloadCompleted {
        job_id: JobId,
        target_path: String,
    },
    DownloadFailed {
        job_id: JobId,
        last_error: String,
        attempts: u32,
        can_retry: bool,
    },
    DownloadStatus {
        job_id: JobId,
        status: DownloadStatus,
    },
    SearchResultsStream {
        fingerprint: String,
        result_count: usize,
    },
    IndexerHealth {
        indexer_id: IndexerId,
        status: IndexerStatus,
    },
    LibraryUpdate {
        book_id: String,
    },
    SystemAlert {
        level: AlertLevel,
        message: String,
    },
    Subscribed {
        channel: String,
    },
    Authenticated {
        user_id: UserId,
    },
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// The envelope every event is wrapped in before it reaches a client:
/// `{type, timestamp, userId?, data}`. `kind` carries both the
/// discriminant (`type`) and `data` via serde's internal tagging, so
/// the envelope only needs to add `timestamp`/`user_id`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    #[cfg(feature = "chrono")]
    pub timestamp: DateTime<Utc>,
    /// `None` for broadcast events.
    pub user_id: Option<UserId>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: EventKind,
}

impl Event {
    pub fn for_user(user_id: UserId, kind: EventKind) -> Self {
        Self {
            #[cfg(feature = "chrono")]
            timestamp: Utc::now(),
            user_id: Some(user_id),
            kind,
        }
    }

    pub fn broadcast(kind: EventKind) -> Self {
        Self {
            #[cfg(feature = "chrono")]
            timestamp: Utc::now(),
            user_id: None,
            kind,
        }
    }
}
