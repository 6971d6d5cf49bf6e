//! Per-user preferences consulted by the Search Engine's ranking and
//! indexer-permission filtering.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::IndexerId;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UserPreferences {
    /// Formats ordered by user preference, highest first; consulted as
    /// a ranking tiebreaker input, not a hard filter.
    pub format_priority: Vec<String>,
    pub max_results_override: Option<usize>,
    pub preferred_language: Option<String>,
    /// Indexers this user is forbidden from querying, enforced at the
    /// search engine's "user-permitted" filter stage.
    pub blocked_indexers: Vec<IndexerId>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            format_priority: Vec::new(),
            max_results_override: None,
            preferred_language: None,
            blocked_indexers: Vec::new(),
        }
    }
}

impl UserPreferences {
    pub fn is_indexer_permitted(&self, indexer_id: IndexerId) -> bool {
        !self.blocked_indexers.contains(&indexer_id)
    }
}
