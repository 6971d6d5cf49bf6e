//! Search Engine: fingerprinted cache, parallel fan-out over candidate
//! indexers, dedup/merge/cap, final sort, cache write + history append.
//!
//! Fan-out/merge spawns one task per candidate indexer and joins them
//! all; the fingerprint/cache entry follows a TTL-entry shape.

pub mod normalize;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;

use foliofox_model::ids::{IndexerId, UserId};
use foliofox_model::indexer::IndexerStatus;
use foliofox_model::search::{SearchCacheEntry, SearchFilters, SearchRequest, SearchResponse, SearchResult};

use crate::db::health::HealthRepository;
use crate::db::indexers::IndexerRepository;
use crate::db::preferences::PreferencesRepository;
use crate::db::search_cache::SearchCacheRepository;
use crate::db::users::UserRepository;
use crate::error::{CoreError, CoreResult};
use crate::registry::Registry;

/// `(normalize(title), normalize(author), format)`.
type DedupKey = (String, String, String);

pub struct SearchEngine {
    registry: Registry,
    indexer_repo: Arc<IndexerRepository>,
    health_repo: Arc<HealthRepository>,
    preferences_repo: Arc<PreferencesRepository>,
    cache_repo: Arc<SearchCacheRepository>,
    user_repo: Arc<UserRepository>,
    cache_ttl: Duration,
    max_results: usize,
    timeout: Duration,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("max_results", &self.max_results)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SearchEngine {
    pub fn new(
        registry: Registry,
        indexer_repo: Arc<IndexerRepository>,
        health_repo: Arc<HealthRepository>,
        preferences_repo: Arc<PreferencesRepository>,
        cache_repo: Arc<SearchCacheRepository>,
        user_repo: Arc<UserRepository>,
        cache_ttl: Duration,
        max_results: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            indexer_repo,
            health_repo,
            preferences_repo,
            cache_repo,
            user_repo,
            cache_ttl,
            max_results,
            timeout,
        }
    }

    pub async fn search(&self, user_id: UserId, req: SearchRequest) -> CoreResult<SearchResponse> {
        let started = Instant::now();
        let fingerprint = compute_fingerprint(&req.query, &req.filters, user_id);
        self.user_repo.ensure(user_id).await?;

        if req.use_cache {
            if let Some(entry) = self.cache_repo.get_fresh(&fingerprint).await? {
                self.cache_repo
                    .append_history(&fingerprint, user_id, &req.query, entry.results.len(), true)
                    .await?;
                return Ok(SearchResponse {
                    results: entry.results,
                    duration_ms: started.elapsed().as_millis() as u64,
                    indexers_queried: Vec::new(),
                    indexers_failed: Vec::new(),
                    cache_hit: true,
                });
            }
        }

        let candidates = self.candidate_indexers(user_id, &req.indexer_subset).await?;
        let deadline = Instant::now() + self.timeout;

        let mut tasks = JoinSet::new();
        for indexer in &candidates {
            let registry = self.registry.clone();
            let indexer_id = indexer.id;
            let query = req.query.clone();
            let filters = req.filters.clone();
            tasks.spawn(async move {
                let result = registry.search(indexer_id, &query, &filters, deadline).await;
                (indexer_id, result)
            });
        }

        let mut accumulator: HashMap<DedupKey, SearchResult> = HashMap::new();
        let mut indexers_queried = Vec::new();
        let mut indexers_failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let Ok((indexer_id, result)) = joined else {
                continue;
            };
            indexers_queried.push(indexer_id);
            match result {
                Ok(results) => {
                    for candidate in results {
                        merge_candidate(&mut accumulator, candidate, self.max_results);
                    }
                }
                Err(err) => indexers_failed.push((indexer_id, err.to_string())),
            }
        }

        if !candidates.is_empty() && indexers_failed.len() == candidates.len() {
            return Err(CoreError::other(format!(
                "all {} queried indexers failed",
                candidates.len()
            )));
        }

        let mut results: Vec<SearchResult> = accumulator.into_values().collect();
        results.sort_by(final_order);

        self.cache_repo
            .put(&SearchCacheEntry {
                fingerprint: fingerprint.clone(),
                results: results.clone(),
                created_at: chrono::Utc::now(),
                expires_at: chrono::Utc::now() + chrono::Duration::from_std(self.cache_ttl).unwrap_or_default(),
            })
            .await?;
        self.cache_repo
            .append_history(&fingerprint, user_id, &req.query, results.len(), false)
            .await?;

        Ok(SearchResponse {
            results,
            duration_ms: started.elapsed().as_millis() as u64,
            indexers_queried,
            indexers_failed,
            cache_hit: false,
        })
    }

    async fn candidate_indexers(
        &self,
        user_id: UserId,
        subset: &[IndexerId],
    ) -> CoreResult<Vec<foliofox_model::indexer::Indexer>> {
        let preferences = self.preferences_repo.get(user_id).await?;
        let enabled = self.indexer_repo.list_enabled().await?;

        let mut candidates = Vec::new();
        for indexer in enabled {
            if !subset.is_empty() && !subset.contains(&indexer.id) {
                continue;
            }
            if !preferences.is_indexer_permitted(indexer.id) {
                continue;
            }
            let status = self
                .health_repo
                .get(indexer.id)
                .await?
                .map(|h| h.status)
                .unwrap_or(IndexerStatus::Healthy);
            if status == IndexerStatus::Down {
                continue;
            }
            candidates.push(indexer);
        }
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(candidates)
    }
}

fn compute_fingerprint(query: &str, filters: &SearchFilters, user_id: UserId) -> String {
    let normalized_query = normalize::normalize(query);
    let mut hasher = Sha256::new();
    hasher.update(normalized_query.as_bytes());
    hasher.update(b"\0");
    for (key, value) in filters {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\0");
    hasher.update(user_id.as_uuid().as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn dedup_key(result: &SearchResult) -> DedupKey {
    (
        normalize::normalize(&result.title),
        normalize::normalize(result.author.as_deref().unwrap_or("")),
        result.format.to_ascii_lowercase(),
    )
}

/// Higher `qualityScore` wins; ties by higher-priority indexer; further
/// ties by earlier `foundAt`.
fn candidate_wins(new: &SearchResult, existing: &SearchResult) -> bool {
    if new.quality_score != existing.quality_score {
        return new.quality_score > existing.quality_score;
    }
    if new.indexer_priority != existing.indexer_priority {
        return new.indexer_priority > existing.indexer_priority;
    }
    new.found_at < existing.found_at
}

fn merge_candidate(accumulator: &mut HashMap<DedupKey, SearchResult>, candidate: SearchResult, max_results: usize) {
    let key = dedup_key(&candidate);

    if let Some(existing) = accumulator.get(&key) {
        if candidate_wins(&candidate, existing) {
            accumulator.insert(key, candidate);
        }
        return;
    }

    if accumulator.len() >= max_results {
        let min_entry = accumulator
            .iter()
            .min_by_key(|(_, v)| v.quality_score)
            .map(|(k, v)| (k.clone(), v.quality_score));
        let Some((min_key, min_quality)) = min_entry else {
            accumulator.insert(key, candidate);
            return;
        };
        if candidate.quality_score > min_quality {
            accumulator.remove(&min_key);
            accumulator.insert(key, candidate);
        }
        return;
    }

    accumulator.insert(key, candidate);
}

fn final_order(a: &SearchResult, b: &SearchResult) -> std::cmp::Ordering {
    b.quality_score
        .cmp(&a.quality_score)
        .then_with(|| b.indexer_priority.cmp(&a.indexer_priority))
        .then_with(|| a.title.cmp(&b.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(title: &str, quality: u8, priority: i32) -> SearchResult {
        SearchResult {
            indexer_id: IndexerId::from_name("test"),
            indexer_name: "test".to_string(),
            indexer_priority: priority,
            title: title.to_string(),
            author: None,
            format: "epub".to_string(),
            file_size_bytes: None,
            quality_score: quality,
            download_url: "https://example.com/1".to_string(),
            language: None,
            publication_year: None,
            found_at: Utc::now(),
            tags: Vec::new(),
            description: None,
            cover_url: None,
        }
    }

    #[test]
    fn higher_quality_wins_on_dedup_collision() {
        let mut accumulator = HashMap::new();
        merge_candidate(&mut accumulator, sample("Dune", 50, 0), 100);
        merge_candidate(&mut accumulator, sample("Dune", 80, 0), 100);
        assert_eq!(accumulator.len(), 1);
        assert_eq!(accumulator.values().next().unwrap().quality_score, 80);
    }

    #[test]
    fn cap_evicts_minimum_when_full() {
        let mut accumulator = HashMap::new();
        merge_candidate(&mut accumulator, sample("A", 10, 0), 2);
        merge_candidate(&mut accumulator, sample("B", 20, 0), 2);
        merge_candidate(&mut accumulator, sample("C", 30, 0), 2);
        assert_eq!(accumulator.len(), 2);
        let titles: Vec<&str> = accumulator.values().map(|r| r.title.as_str()).collect();
        assert!(titles.contains(&"B"));
        assert!(titles.contains(&"C"));
        assert!(!titles.contains(&"A"));
    }

    #[test]
    fn low_quality_candidate_dropped_when_full() {
        let mut accumulator = HashMap::new();
        merge_candidate(&mut accumulator, sample("A", 50, 0), 1);
        merge_candidate(&mut accumulator, sample("B", 10, 0), 1);
        assert_eq!(accumulator.len(), 1);
        assert_eq!(accumulator.values().next().unwrap().title, "A");
    }

    #[test]
    fn final_sort_is_quality_then_priority_then_title() {
        let mut results = vec![sample("Zephyr", 50, 0), sample("Alpha", 50, 0), sample("Beta", 90, 1)];
        results.sort_by(final_order);
        assert_eq!(results[0].title, "Beta");
        assert_eq!(results[1].title, "Alpha");
        assert_eq!(results[2].title, "Zephyr");
    }

    #[test]
    fn fingerprint_is_deterministic_and_user_scoped() {
        let filters = SearchFilters::new();
        let user_a = UserId::new();
        let user_b = UserId::new();
        let f1 = compute_fingerprint("Dune", &filters, user_a);
        let f2 = compute_fingerprint("Dune", &filters, user_a);
        let f3 = compute_fingerprint("Dune", &filters, user_b);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
    }
}
