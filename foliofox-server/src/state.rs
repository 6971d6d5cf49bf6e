//! `AppState`: the `Clone`-cheap struct handed to every Axum handler —
//! one `Arc` per long-lived collaborator, no interior business logic.

use std::sync::Arc;

use foliofox_core::container::Container;
use foliofox_core::db::indexers::IndexerRepository;
use foliofox_core::events::EventBus;
use foliofox_core::health::HealthMonitor;
use foliofox_core::registry::Registry;
use foliofox_core::scheduler::Scheduler;
use foliofox_core::search::SearchEngine;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub health: Arc<HealthMonitor>,
    pub search: Arc<SearchEngine>,
    pub scheduler: Scheduler,
    pub events: EventBus,
    pub indexers: Arc<IndexerRepository>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn from_container(container: &Container) -> Self {
        Self {
            registry: container.registry.clone(),
            health: container.health.clone(),
            search: container.search.clone(),
            scheduler: container.scheduler.clone(),
            events: container.events.clone(),
            indexers: Arc::new(IndexerRepository::new(container.db.clone())),
        }
    }
}
