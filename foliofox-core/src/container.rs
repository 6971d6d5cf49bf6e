//! Wires the five components together from a loaded [`foliofox_config::models::Config`].
//!
//! One constructor that opens the database, builds every collaborator,
//! and hands back a single struct the server crate holds in its app
//! state. The only non-obvious step is breaking the Registry↔HealthMonitor
//! cycle: the registry is built first with no reporter, the health
//! monitor is built against it, and only then is
//! `Registry::set_outcome_reporter` called to close the loop.

use std::sync::Arc;

use tokio::sync::watch;

use foliofox_config::models::{Config, ProviderConfig};
use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::{Indexer, IndexerKind};

use crate::db::books::BookRepository;
use crate::db::downloads::DownloadRepository;
use crate::db::health::HealthRepository;
use crate::db::indexers::IndexerRepository;
use crate::db::preferences::PreferencesRepository;
use crate::db::search_cache::SearchCacheRepository;
use crate::db::users::UserRepository;
use crate::db::{self, DbPool};
use crate::error::CoreResult;
use crate::events::EventBus;
use crate::health::HealthMonitor;
use crate::organize::{FileOrganizer, LibraryFileOrganizer};
use crate::registry::direct_newznab::DirectNewznabAdapter;
use crate::registry::jackett::JackettAdapter;
use crate::registry::prowlarr::ProwlarrAdapter;
use crate::registry::{IndexerAdapter, Registry};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::search::SearchEngine;

/// Every running collaborator, plus the shutdown switch that stops the
/// background tasks (`HealthMonitor::run`, `EventBus::run`, and the
/// scheduler actor all watch it).
pub struct Container {
    pub registry: Registry,
    pub health: Arc<HealthMonitor>,
    pub search: Arc<SearchEngine>,
    pub scheduler: Scheduler,
    pub events: EventBus,
    pub db: DbPool,
    shutdown_tx: watch::Sender<bool>,
}

impl Container {
    pub async fn build(config: &Config) -> CoreResult<Self> {
        let pool = db::connect_and_migrate(&config.database.path).await?;

        let indexer_repo = Arc::new(IndexerRepository::new(pool.clone()));
        let health_repo = Arc::new(HealthRepository::new(pool.clone()));
        let preferences_repo = Arc::new(PreferencesRepository::new(pool.clone()));
        let cache_repo = Arc::new(SearchCacheRepository::new(pool.clone()));
        let download_repo = Arc::new(DownloadRepository::new(pool.clone()));
        let user_repo = Arc::new(UserRepository::new(pool.clone()));

        let registry = Registry::new();
        load_indexers(&registry, &indexer_repo, &config.downloads.user_agent, config.prowlarr.as_ref(), config.jackett.as_ref()).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let events = EventBus::new(
            config.events.ping_period,
            config.events.pong_wait,
            config.events.idle_timeout,
        );

        let health = HealthMonitor::new(
            registry.clone(),
            health_repo.clone(),
            events.clone(),
            config.health.check_interval,
            config.health.probe_timeout,
            config.health.sample_window,
        );
        registry.set_outcome_reporter(health.clone());

        let search = Arc::new(SearchEngine::new(
            registry.clone(),
            indexer_repo.clone(),
            health_repo.clone(),
            preferences_repo.clone(),
            cache_repo.clone(),
            user_repo.clone(),
            config.search.cache_ttl,
            config.search.max_results,
            config.search.timeout_seconds,
        ));

        let book_repo = BookRepository::new(pool.clone());
        let organizer: Arc<dyn FileOrganizer> =
            Arc::new(LibraryFileOrganizer::new(config.downloads.download_path.clone(), book_repo));
        let scheduler = Scheduler::spawn(
            SchedulerConfig::from(&config.downloads),
            download_repo,
            user_repo,
            registry.clone(),
            events.clone(),
            organizer,
            shutdown_rx.clone(),
        );

        tokio::spawn({
            let health = health.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move { health.run(shutdown_rx).await }
        });
        tokio::spawn({
            let events = events.clone();
            let shutdown_rx = shutdown_rx.clone();
            async move { events.run(shutdown_rx).await }
        });

        Ok(Self {
            registry,
            health,
            search,
            scheduler,
            events,
            db: pool,
            shutdown_tx,
        })
    }

    /// Stops the background tasks (`HealthMonitor`, `EventBus`, and the
    /// scheduler actor all watch the same switch).
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn load_indexers(
    registry: &Registry,
    indexer_repo: &Arc<IndexerRepository>,
    user_agent: &str,
    prowlarr: Option<&ProviderConfig>,
    jackett: Option<&ProviderConfig>,
) -> CoreResult<()> {
    // Per-call deadlines come from each indexer's own `timeout` column;
    // the shared `reqwest::Client` only needs the user agent every
    // adapter presents itself with.
    let client = reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .build()?;

    seed_provider(indexer_repo, IndexerKind::Prowlarr, "prowlarr", prowlarr).await?;
    seed_provider(indexer_repo, IndexerKind::Jackett, "jackett", jackett).await?;

    for indexer in indexer_repo.list_enabled().await? {
        match build_adapter(&client, &indexer) {
            Ok(adapter) => registry.load(indexer, adapter),
            Err(err) => {
                tracing::warn!(indexer = %indexer.name, error = %err, "skipping indexer with invalid configuration");
            }
        }
    }
    Ok(())
}

/// Ensures a `prowlarr`/`jackett` row exists once a matching
/// `config.{prowlarr,jackett}` block is configured. The row is otherwise
/// an admin-managed entity, so this only ever inserts — it never
/// overwrites an indexer an admin has since edited through the API.
/// `name` is also the value `build_adapter` later reuses as the
/// upstream provider identifier.
async fn seed_provider(
    indexer_repo: &Arc<IndexerRepository>,
    kind: IndexerKind,
    name: &str,
    provider: Option<&ProviderConfig>,
) -> CoreResult<()> {
    let Some(provider) = provider else { return Ok(()) };
    if indexer_repo.find_by_kind(kind).await?.is_some() {
        return Ok(());
    }
    let indexer = Indexer {
        id: IndexerId::new(),
        name: name.to_string(),
        kind,
        base_url: provider.base_url.clone(),
        api_key: Some(provider.api_key.clone()),
        enabled: true,
        priority: 0,
        rate_limit_requests: provider.rate_limit_requests,
        rate_limit_window: provider.rate_limit_window,
        timeout: provider.timeout,
        max_concurrent_downloads: 2,
    };
    indexer_repo.insert(&indexer).await
}

/// Builds the right adapter for an indexer's configured kind. Prowlarr
/// and Jackett both address one backing indexer by an id/slug that
/// `Indexer` has no dedicated column for, so `indexer.name` doubles as
/// that identifier for those two kinds; a direct Newznab indexer needs
/// no such extra value.
fn build_adapter(client: &reqwest::Client, indexer: &Indexer) -> Result<Arc<dyn IndexerAdapter>, foliofox_model::error::DomainError> {
    match indexer.kind {
        IndexerKind::Direct => Ok(Arc::new(DirectNewznabAdapter::new(
            client.clone(),
            indexer.id,
            indexer.name.clone(),
            indexer.priority,
            &indexer.base_url,
            indexer.api_key.clone(),
        )?)),
        IndexerKind::Prowlarr => Ok(Arc::new(ProwlarrAdapter::new(
            client.clone(),
            indexer.id,
            indexer.name.clone(),
            indexer.priority,
            &indexer.base_url,
            indexer.api_key.clone(),
            indexer.name.clone(),
        )?)),
        IndexerKind::Jackett => Ok(Arc::new(JackettAdapter::new(
            client.clone(),
            indexer.id,
            indexer.name.clone(),
            indexer.priority,
            &indexer.base_url,
            indexer.api_key.clone(),
            indexer.name.clone(),
        )?)),
    }
}
