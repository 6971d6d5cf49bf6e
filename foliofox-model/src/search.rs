//! Search request/response shapes.

use std::collections::BTreeMap;

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::IndexerId;

/// Arbitrary filter key/value pairs. A `BTreeMap` keeps iteration order
/// deterministic so the fingerprint hash, which sorts filter keys,
/// doesn't need a separate sort step.
pub type SearchFilters = BTreeMap<String, String>;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    /// Restrict the fan-out to this subset of indexers; empty means "all
    /// permitted."
    pub indexer_subset: Vec<IndexerId>,
    pub use_cache: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: SearchFilters::new(),
            indexer_subset: Vec::new(),
            use_cache: true,
        }
    }
}

/// A single normalized hit from one indexer. `(indexer_id,
/// download_url)` uniquely identifies a result *before* dedup; after
/// dedup, `(normalize(title), normalize(author), format)` is the key.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchResult {
    pub indexer_id: IndexerId,
    pub indexer_name: String,
    pub indexer_priority: i32,
    pub title: String,
    pub author: Option<String>,
    pub format: String,
    pub file_size_bytes: Option<u64>,
    /// 0-100 composite, see `foliofox_core::search::scoring`.
    pub quality_score: u8,
    pub download_url: String,
    pub language: Option<String>,
    pub publication_year: Option<u16>,
    #[cfg(feature = "chrono")]
    pub found_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub cover_url: Option<String>,
}

impl SearchResult {
    /// Clamp any externally-derived score into the documented 0-100
    /// range.
    pub fn clamp_quality_score(mut self) -> Self {
        self.quality_score = self.quality_score.min(100);
        self
    }
}

/// Response handed back from `Search(ctx, req)`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub duration_ms: u64,
    pub indexers_queried: Vec<IndexerId>,
    pub indexers_failed: Vec<(IndexerId, String)>,
    pub cache_hit: bool,
}

/// Cached, serialized result set keyed by fingerprint.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchCacheEntry {
    pub fingerprint: String,
    pub results: Vec<SearchResult>,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "chrono")]
    pub expires_at: DateTime<Utc>,
}

#[cfg(feature = "chrono")]
impl SearchCacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One row of `search_history`, owned by the Search Engine.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchHistoryEntry {
    pub fingerprint: String,
    pub user_id: crate::ids::UserId,
    pub query: String,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    pub result_count: usize,
    pub cache_hit: bool,
}
