//! The Indexer Client Registry.
//!
//! A uniform capability — `search`/`fetch`/`probe` — wraps one adapter
//! per configured indexer: one struct per upstream sharing a single
//! `reqwest::Client`, held in a `DashMap` of loaded adapters with one
//! rate limiter per indexer and a fan-out-by-spawned-task search helper
//! used by `crate::search`.

pub mod direct_newznab;
pub mod http;
pub mod jackett;
pub mod newznab_xml;
pub mod prowlarr;
pub mod rate_limit;
pub mod scoring;

use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::BoxStream;

use foliofox_model::error::DomainError;
use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::Indexer;
use foliofox_model::search::{SearchFilters, SearchResult};

use rate_limit::RateLimiter;

/// A streamed download body. Boxed because each adapter produces a
/// differently-typed `reqwest` byte stream.
pub type ByteStream = BoxStream<'static, Result<Bytes, DomainError>>;

/// One upstream indexer kind's wire protocol, hidden behind a single
/// uniform `search`/`fetch`/`probe` capability.
#[async_trait]
pub trait IndexerAdapter: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        deadline: Instant,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn fetch(&self, download_url: &str, deadline: Instant) -> Result<ByteStream, DomainError>;

    /// The indexer kind's cheapest supported call, used by the Health
    /// Monitor's probe: capabilities endpoint for Newznab,
    /// `/api/v1/indexer` for Prowlarr, `/api/v2.0/server/config` for
    /// Jackett.
    async fn probe(&self, deadline: Instant) -> Result<(), DomainError>;
}

/// Passive observation an adapter call feeds back to the Health Monitor
/// outside of its own probe cadence.
pub trait OutcomeReporter: Send + Sync {
    fn report_outcome(&self, indexer_id: IndexerId, success: bool);
}

struct Entry {
    indexer: Indexer,
    adapter: Arc<dyn IndexerAdapter>,
    limiter: Arc<RateLimiter>,
}

/// The registry of loaded indexer adapters. Cheap to clone — the
/// `DashMap` is `Arc`-backed.
#[derive(Clone)]
pub struct Registry {
    entries: Arc<DashMap<IndexerId, Entry>>,
    reporter: Arc<RwLock<Option<Arc<dyn OutcomeReporter>>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("indexer_count", &self.entries.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            reporter: Arc::new(RwLock::new(None)),
        }
    }

    /// Wires the Health Monitor in after both are constructed, breaking
    /// the Registry→HealthMonitor→Registry cycle.
    pub fn set_outcome_reporter(&self, reporter: Arc<dyn OutcomeReporter>) {
        *self.reporter.write().expect("reporter lock poisoned") = Some(reporter);
    }

    pub fn load(&self, indexer: Indexer, adapter: Arc<dyn IndexerAdapter>) {
        let limiter = Arc::new(RateLimiter::new(
            indexer.rate_limit_requests,
            indexer.rate_limit_window,
        ));
        self.entries.insert(
            indexer.id,
            Entry {
                indexer,
                adapter,
                limiter,
            },
        );
    }

    pub fn unload(&self, indexer_id: IndexerId) {
        self.entries.remove(&indexer_id);
    }

    pub fn indexer(&self, indexer_id: IndexerId) -> Option<Indexer> {
        self.entries.get(&indexer_id).map(|e| e.indexer.clone())
    }

    pub fn loaded_ids(&self) -> Vec<IndexerId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Per-call deadline = min(ctx deadline, indexer.timeout).
    fn call_deadline(&self, indexer: &Indexer, ctx_deadline: Instant) -> Instant {
        ctx_deadline.min(Instant::now() + indexer.timeout)
    }

    pub async fn search(
        &self,
        indexer_id: IndexerId,
        query: &str,
        filters: &SearchFilters,
        ctx_deadline: Instant,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let entry = self.get(indexer_id)?;
        let deadline = self.call_deadline(&entry.indexer, ctx_deadline);
        entry.limiter.acquire(deadline).await?;
        let result = entry.adapter.search(query, filters, deadline).await;
        self.report(indexer_id, result.is_ok());
        result
    }

    pub async fn fetch(
        &self,
        indexer_id: IndexerId,
        download_url: &str,
        ctx_deadline: Instant,
    ) -> Result<ByteStream, DomainError> {
        let entry = self.get(indexer_id)?;
        let deadline = self.call_deadline(&entry.indexer, ctx_deadline);
        entry.limiter.acquire(deadline).await?;
        let result = entry.adapter.fetch(download_url, deadline).await;
        self.report(indexer_id, result.is_ok());
        result
    }

    pub async fn probe(&self, indexer_id: IndexerId, deadline: Instant) -> Result<(), DomainError> {
        let entry = self.get(indexer_id)?;
        entry.adapter.probe(deadline).await
    }

    fn get(&self, indexer_id: IndexerId) -> Result<Arc<EntryHandle>, DomainError> {
        self.entries
            .get(&indexer_id)
            .map(|e| {
                Arc::new(EntryHandle {
                    indexer: e.indexer.clone(),
                    adapter: Arc::clone(&e.adapter),
                    limiter: Arc::clone(&e.limiter),
                })
            })
            .ok_or_else(|| DomainError::IndexerUnreachable("indexer not loaded".to_string()))
    }

    fn report(&self, indexer_id: IndexerId, success: bool) {
        let reporter = self.reporter.read().expect("reporter lock poisoned").clone();
        if let Some(reporter) = reporter {
            reporter.report_outcome(indexer_id, success);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned snapshot of a [`Entry`] so a call can run without holding the
/// `DashMap` shard lock across `.await` points.
struct EntryHandle {
    indexer: Indexer,
    adapter: Arc<dyn IndexerAdapter>,
    limiter: Arc<RateLimiter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct StubAdapter {
        succeed: bool,
    }

    #[async_trait]
    impl IndexerAdapter for StubAdapter {
        async fn search(
            &self,
            _query: &str,
            _filters: &SearchFilters,
            _deadline: Instant,
        ) -> Result<Vec<SearchResult>, DomainError> {
            if self.succeed {
                Ok(vec![])
            } else {
                Err(DomainError::IndexerUnreachable("stub".to_string()))
            }
        }

        async fn fetch(&self, _url: &str, _deadline: Instant) -> Result<ByteStream, DomainError> {
            Err(DomainError::IndexerUnreachable("stub".to_string()))
        }

        async fn probe(&self, _deadline: Instant) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct StubReporter {
        seen: Arc<AtomicBool>,
    }

    impl OutcomeReporter for StubReporter {
        fn report_outcome(&self, _indexer_id: IndexerId, success: bool) {
            self.seen.store(success, Ordering::SeqCst);
        }
    }

    fn test_indexer() -> Indexer {
        Indexer {
            id: IndexerId::new(),
            name: "test".to_string(),
            kind: foliofox_model::indexer::IndexerKind::Direct,
            base_url: "https://example.com".to_string(),
            api_key: None,
            enabled: true,
            priority: 0,
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            timeout: Duration::from_secs(5),
            max_concurrent_downloads: 2,
        }
    }

    #[tokio::test]
    async fn reports_outcome_after_search() {
        let registry = Registry::new();
        let seen = Arc::new(AtomicBool::new(true));
        registry.set_outcome_reporter(Arc::new(StubReporter { seen: seen.clone() }));

        let indexer = test_indexer();
        let id = indexer.id;
        registry.load(indexer, Arc::new(StubAdapter { succeed: false }));

        let _ = registry
            .search(id, "q", &SearchFilters::new(), Instant::now() + Duration::from_secs(1))
            .await;

        assert!(!seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unloaded_indexer_is_unreachable() {
        let registry = Registry::new();
        let result = registry
            .search(
                IndexerId::new(),
                "q",
                &SearchFilters::new(),
                Instant::now() + Duration::from_secs(1),
            )
            .await;
        assert!(matches!(result, Err(DomainError::IndexerUnreachable(_))));
    }
}
