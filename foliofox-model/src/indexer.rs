//! Indexer configuration and health state.

use std::time::Duration;

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::IndexerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IndexerKind {
    Prowlarr,
    Jackett,
    Direct,
}

impl IndexerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerKind::Prowlarr => "prowlarr",
            IndexerKind::Jackett => "jackett",
            IndexerKind::Direct => "direct",
        }
    }
}

/// A configured indexer endpoint. Mutated only by admin config actions;
/// `priority` is a total order — disabled indexers never receive
/// traffic regardless of priority.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Indexer {
    pub id: IndexerId,
    pub name: String,
    pub kind: IndexerKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub enabled: bool,
    /// Higher is preferred.
    pub priority: i32,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub timeout: Duration,
    /// Per-indexer concurrent-download cap.
    pub max_concurrent_downloads: u32,
}

impl Indexer {
    pub fn is_usable(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IndexerStatus {
    Healthy,
    Degraded,
    Down,
}

impl IndexerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexerStatus::Healthy => "healthy",
            IndexerStatus::Degraded => "degraded",
            IndexerStatus::Down => "down",
        }
    }
}

/// One record per indexer, monotonically updated by the Health Monitor,
/// which exclusively owns this table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexerHealth {
    pub indexer_id: IndexerId,
    pub status: IndexerStatus,
    #[cfg(feature = "chrono")]
    pub last_check: DateTime<Utc>,
    pub latency_ms: Option<u32>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl IndexerHealth {
    pub fn initial(indexer_id: IndexerId) -> Self {
        Self {
            indexer_id,
            status: IndexerStatus::Healthy,
            #[cfg(feature = "chrono")]
            last_check: Utc::now(),
            latency_ms: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}
