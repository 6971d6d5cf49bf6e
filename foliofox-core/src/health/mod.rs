//! Health Monitor: per-indexer periodic probes plus passive
//! observations fed back from the registry, combined into a
//! sliding-window status classification.
//!
//! Each indexer gets its own staggered ticker task, all driven through
//! a `tokio::select!` actor loop alongside a channel draining passive
//! outcome reports.

mod window;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::{IndexerHealth, IndexerStatus};

use crate::db::health::HealthRepository;
use crate::events::EventBus;
use crate::registry::{OutcomeReporter, Registry};

use window::{Sample, SlidingWindow};

struct WindowState {
    window: SlidingWindow,
    last_status: IndexerStatus,
    consecutive_failures: u32,
}

/// Outcome-report channel depth. Generous relative to expected indexer
/// count — `report_outcome` is non-blocking and simply drops a sample
/// on overflow rather than stalling the caller's search/fetch path.
const OUTCOME_CHANNEL_CAPACITY: usize = 1024;

pub struct HealthMonitor {
    registry: Registry,
    repo: Arc<HealthRepository>,
    events: EventBus,
    check_interval: Duration,
    probe_timeout: Duration,
    sample_window: usize,
    windows: Arc<dashmap::DashMap<IndexerId, Mutex<WindowState>>>,
    outcome_tx: mpsc::Sender<(IndexerId, bool)>,
    outcome_rx: Mutex<Option<mpsc::Receiver<(IndexerId, bool)>>>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("tracked_indexers", &self.windows.len())
            .finish()
    }
}

impl HealthMonitor {
    pub fn new(
        registry: Registry,
        repo: Arc<HealthRepository>,
        events: EventBus,
        check_interval: Duration,
        probe_timeout: Duration,
        sample_window: usize,
    ) -> Arc<Self> {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        Arc::new(Self {
            registry,
            repo,
            events,
            check_interval,
            probe_timeout,
            sample_window,
            windows: Arc::new(dashmap::DashMap::new()),
            outcome_tx,
            outcome_rx: Mutex::new(Some(outcome_rx)),
        })
    }

    pub async fn current(&self, indexer_id: IndexerId) -> Option<IndexerHealth> {
        self.repo.get(indexer_id).await.ok().flatten()
    }

    pub async fn list_all(&self) -> Vec<IndexerHealth> {
        self.repo.list_all().await.unwrap_or_default()
    }

    /// Spawns one staggered probe task per currently-loaded indexer plus
    /// one task draining passive outcome reports, and runs until
    /// `shutdown` fires. Probe errors never escape this loop — the
    /// monitor itself never fails fatally, it only ever records a bad
    /// sample and keeps ticking.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        let indexer_ids = self.registry.loaded_ids();

        for (i, indexer_id) in indexer_ids.into_iter().enumerate() {
            let this = Arc::clone(&self);
            let mut shutdown_rx = shutdown.clone();
            let stagger = this.stagger_offset(indexer_id, i);
            tasks.spawn(async move {
                tokio::time::sleep(stagger).await;
                let mut ticker = tokio::time::interval(this.check_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            this.probe_one(indexer_id).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        if let Some(mut outcome_rx) = self.outcome_rx.lock().expect("outcome_rx lock poisoned").take() {
            let this = Arc::clone(&self);
            let mut shutdown_rx = shutdown.clone();
            tasks.spawn(async move {
                loop {
                    tokio::select! {
                        received = outcome_rx.recv() => {
                            let Some((indexer_id, success)) = received else { break };
                            this.record_sample(indexer_id, success, None).await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Deterministic per-indexer offset within `[0, check_interval)` so
    /// probes don't all thunder at once on startup.
    fn stagger_offset(&self, indexer_id: IndexerId, fallback_index: usize) -> Duration {
        let interval_ms = self.check_interval.as_millis().max(1) as u128;
        let hashed = indexer_id.as_uuid().as_u128();
        let offset_ms = if interval_ms > 0 {
            (hashed % interval_ms) as u64
        } else {
            (fallback_index as u64) * 100
        };
        Duration::from_millis(offset_ms)
    }

    async fn probe_one(&self, indexer_id: IndexerId) {
        let deadline = Instant::now() + self.probe_timeout;
        let start = Instant::now();
        match self.registry.probe(indexer_id, deadline).await {
            Ok(()) => {
                let latency_ms = start.elapsed().as_millis().min(u32::MAX as u128) as u32;
                self.record_sample(indexer_id, true, Some(latency_ms)).await;
            }
            Err(err) => {
                debug!(%indexer_id, error = %err, "indexer probe failed");
                self.record_sample_with_error(indexer_id, false, None, Some(err.to_string()))
                    .await;
            }
        }
    }

    async fn record_sample(&self, indexer_id: IndexerId, success: bool, latency_ms: Option<u32>) {
        self.record_sample_with_error(indexer_id, success, latency_ms, None).await;
    }

    async fn record_sample_with_error(
        &self,
        indexer_id: IndexerId,
        success: bool,
        latency_ms: Option<u32>,
        last_error: Option<String>,
    ) {
        let (status, consecutive_failures, transitioned, recent_latency) = {
            let entry = self.windows.entry(indexer_id).or_insert_with(|| {
                Mutex::new(WindowState {
                    window: SlidingWindow::new(self.sample_window),
                    last_status: IndexerStatus::Healthy,
                    consecutive_failures: 0,
                })
            });
            let mut state = entry.lock().expect("window lock poisoned");
            state.window.push(Sample { success, latency_ms });
            if success {
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
            }
            let status = classify(&state.window);
            let transitioned = status != state.last_status;
            state.last_status = status;
            (status, state.consecutive_failures, transitioned, state.window.most_recent_latency_ms())
        };

        let health = IndexerHealth {
            indexer_id,
            status,
            last_check: chrono::Utc::now(),
            latency_ms: recent_latency,
            consecutive_failures,
            last_error,
        };
        if let Err(err) = self.repo.upsert(&health).await {
            warn!(%indexer_id, error = %err, "failed to persist indexer health");
        }

        if transitioned {
            self.events.publish_broadcast(foliofox_model::event::Event::broadcast(
                foliofox_model::event::EventKind::IndexerHealth { indexer_id, status },
            ));
        }
    }
}

fn classify(window: &SlidingWindow) -> IndexerStatus {
    let successes = window.successes();
    let p95 = window.latency_p95_ms();
    let latency_ok = p95.map(|ms| ms < 5000).unwrap_or(true);

    if successes >= 8 && latency_ok {
        IndexerStatus::Healthy
    } else if successes >= 5 || !latency_ok {
        IndexerStatus::Degraded
    } else {
        IndexerStatus::Down
    }
}

impl OutcomeReporter for HealthMonitor {
    fn report_outcome(&self, indexer_id: IndexerId, success: bool) {
        if self.outcome_tx.try_send((indexer_id, success)).is_err() {
            debug!(%indexer_id, "outcome channel full, dropping sample");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_documented_thresholds() {
        let mut window = SlidingWindow::new(10);
        for _ in 0..8 {
            window.push(Sample { success: true, latency_ms: Some(100) });
        }
        for _ in 0..2 {
            window.push(Sample { success: false, latency_ms: None });
        }
        assert_eq!(classify(&window), IndexerStatus::Healthy);
    }

    #[test]
    fn five_successes_is_degraded() {
        let mut window = SlidingWindow::new(10);
        for _ in 0..5 {
            window.push(Sample { success: true, latency_ms: Some(100) });
        }
        for _ in 0..5 {
            window.push(Sample { success: false, latency_ms: None });
        }
        assert_eq!(classify(&window), IndexerStatus::Degraded);
    }

    #[test]
    fn high_latency_degrades_even_with_many_successes() {
        let mut window = SlidingWindow::new(10);
        for _ in 0..10 {
            window.push(Sample { success: true, latency_ms: Some(6000) });
        }
        assert_eq!(classify(&window), IndexerStatus::Degraded);
    }

    #[test]
    fn under_five_successes_is_down() {
        let mut window = SlidingWindow::new(10);
        for _ in 0..4 {
            window.push(Sample { success: true, latency_ms: Some(100) });
        }
        assert_eq!(classify(&window), IndexerStatus::Down);
    }

    /// S4: six straight probe failures followed by five recoveries
    /// walks `healthy -> down -> degraded`, firing exactly two
    /// `indexer_health` events (one per transition, none for the
    /// unchanged-status samples in between).
    #[tokio::test]
    async fn flap_sequence_emits_exactly_two_transition_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = crate::db::connect_and_migrate(&dir.path().join("health.db"))
            .await
            .expect("migrate test db");
        let repo = Arc::new(HealthRepository::new(pool));
        let registry = Registry::new();
        let events = EventBus::new(Duration::from_secs(60), Duration::from_secs(60), Duration::from_secs(300));
        let (_client_id, mut rx) = events.register(None);

        let monitor = HealthMonitor::new(
            registry,
            repo,
            events,
            Duration::from_secs(60),
            Duration::from_secs(10),
            10,
        );

        let indexer_id = IndexerId::new();
        for _ in 0..6 {
            monitor.record_sample(indexer_id, false, None).await;
        }
        for _ in 0..5 {
            monitor.record_sample(indexer_id, true, Some(10)).await;
        }

        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let foliofox_model::event::EventKind::IndexerHealth { status, .. } = event.kind {
                transitions.push(status);
            }
        }

        assert_eq!(transitions, vec![IndexerStatus::Down, IndexerStatus::Degraded]);
        assert_eq!(monitor.current(indexer_id).await.map(|h| h.status), Some(IndexerStatus::Degraded));
    }
}
