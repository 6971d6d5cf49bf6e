//! End-to-end scheduler scenarios against a real (in-process) SQLite
//! database, driving the scheduler through its actual persistence layer
//! rather than mocking the repository away. Each test stands up a
//! throwaway SQLite file so none of them depend on external services.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use tokio::sync::watch;

use foliofox_core::db::downloads::DownloadRepository;
use foliofox_core::db::users::UserRepository;
use foliofox_core::events::EventBus;
use foliofox_core::organize::NoopFileOrganizer;
use foliofox_core::registry::{ByteStream, IndexerAdapter, Registry};
use foliofox_core::scheduler::{Scheduler, SchedulerConfig};
use foliofox_model::download::DownloadStatus;
use foliofox_model::error::DomainError;
use foliofox_model::event::EventKind;
use foliofox_model::ids::{IndexerId, UserId};
use foliofox_model::indexer::{Indexer, IndexerKind};
use foliofox_model::search::{SearchFilters, SearchResult};

async fn test_db() -> (foliofox_core::db::DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test.db");
    let pool = foliofox_core::db::connect_and_migrate(&db_path)
        .await
        .expect("migrate test db");
    (pool, dir)
}

fn test_indexer(id: IndexerId) -> Indexer {
    Indexer {
        id,
        name: "flaky".to_string(),
        kind: IndexerKind::Direct,
        base_url: "https://example.invalid".to_string(),
        api_key: None,
        enabled: true,
        priority: 0,
        rate_limit_requests: 1000,
        rate_limit_window: Duration::from_secs(1),
        timeout: Duration::from_secs(5),
        max_concurrent_downloads: 2,
    }
}

/// Fails the first `fail_times` fetch calls with a retryable error,
/// then succeeds with a small fixed body.
struct FlakyAdapter {
    fail_times: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl IndexerAdapter for FlakyAdapter {
    async fn search(&self, _q: &str, _f: &SearchFilters, _d: Instant) -> Result<Vec<SearchResult>, DomainError> {
        Ok(vec![])
    }

    async fn fetch(&self, _url: &str, _deadline: Instant) -> Result<ByteStream, DomainError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            return Err(DomainError::IndexerUnreachable("flaky upstream".to_string()));
        }
        Ok(stream::iter(vec![Ok(Bytes::from_static(b"the quick brown fox"))]).boxed())
    }

    async fn probe(&self, _deadline: Instant) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Streams small chunks slowly and indefinitely, so a test can observe
/// `running` with `bytesDownloaded > 0` before cancelling it.
struct SlowAdapter;

#[async_trait]
impl IndexerAdapter for SlowAdapter {
    async fn search(&self, _q: &str, _f: &SearchFilters, _d: Instant) -> Result<Vec<SearchResult>, DomainError> {
        Ok(vec![])
    }

    async fn fetch(&self, _url: &str, _deadline: Instant) -> Result<ByteStream, DomainError> {
        let chunks = stream::unfold(0u32, |i| async move {
            if i >= 100 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            Some((Ok(Bytes::from_static(b"chunk-of-bytes-")), i + 1))
        });
        Ok(chunks.boxed())
    }

    async fn probe(&self, _deadline: Instant) -> Result<(), DomainError> {
        Ok(())
    }
}

fn fast_scheduler_config(download_path: PathBuf) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent: 2,
        // Must stay >= 3 attempts so the retries_transient_failures_then_completes
        // scenario (two failures, then a successful third try) can reach
        // that third attempt before exhaustion kicks in.
        retry_count: 3,
        timeout: Duration::from_secs(5),
        download_path,
        base_retry_delay: Duration::from_millis(20),
        max_retry_delay: Duration::from_millis(200),
    }
}

/// S2: a job that fails twice with a transient error then succeeds
/// ends up `completed` after exactly 3 attempts, with exactly one
/// `download_completed` event delivered.
#[tokio::test]
async fn retries_transient_failures_then_completes() {
    let (pool, download_dir) = test_db().await;
    let repo = Arc::new(DownloadRepository::new(pool.clone()));
    let user_repo = Arc::new(UserRepository::new(pool));
    let registry = Registry::new();

    let indexer_id = IndexerId::new();
    registry.load(
        test_indexer(indexer_id),
        Arc::new(FlakyAdapter {
            fail_times: 2,
            calls: AtomicUsize::new(0),
        }),
    );

    let events = EventBus::new(Duration::from_secs(60), Duration::from_secs(60), Duration::from_secs(300));
    let user_id = UserId::new();
    let (_client_id, mut rx) = events.register(Some(user_id));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::spawn(
        fast_scheduler_config(download_dir.path().to_path_buf()),
        repo,
        user_repo,
        registry,
        events,
        Arc::new(NoopFileOrganizer),
        shutdown_rx,
    );

    let job = scheduler
        .submit(
            user_id,
            indexer_id,
            "https://example.invalid/book.epub".to_string(),
            "Some Book".to_string(),
            "epub".to_string(),
            None,
            0,
        )
        .await
        .expect("submit");

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(current) = scheduler.get(job.id).await.expect("get") {
                if current.status.is_terminal() {
                    return current;
                }
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state in time");

    assert_eq!(completed.status, DownloadStatus::Completed);
    assert_eq!(completed.attempts, 3, "every try counted: two failures plus the successful third");

    let mut completed_events = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        if matches!(event.kind, EventKind::DownloadCompleted { job_id, .. } if job_id == job.id) {
            completed_events += 1;
        }
    }
    assert_eq!(completed_events, 1, "exactly one download_completed event for the job");

    let _ = shutdown_tx.send(true);
}

/// S3: cancelling a running job stops it within the abort window, the
/// partial file is removed, and exactly one `cancelled` status event
/// is delivered.
#[tokio::test]
async fn cancel_while_running_removes_partial_file() {
    let (pool, download_dir) = test_db().await;
    let repo = Arc::new(DownloadRepository::new(pool.clone()));
    let user_repo = Arc::new(UserRepository::new(pool));
    let registry = Registry::new();

    let indexer_id = IndexerId::new();
    registry.load(test_indexer(indexer_id), Arc::new(SlowAdapter));

    let events = EventBus::new(Duration::from_secs(60), Duration::from_secs(60), Duration::from_secs(300));
    let user_id = UserId::new();
    let (_client_id, mut rx) = events.register(Some(user_id));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::spawn(
        fast_scheduler_config(download_dir.path().to_path_buf()),
        repo,
        user_repo,
        registry,
        events,
        Arc::new(NoopFileOrganizer),
        shutdown_rx,
    );

    let job = scheduler
        .submit(
            user_id,
            indexer_id,
            "https://example.invalid/slow.epub".to_string(),
            "Slow Book".to_string(),
            "epub".to_string(),
            None,
            0,
        )
        .await
        .expect("submit");

    let part_path = PathBuf::from(&job.target_path);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(current) = scheduler.get(job.id).await.expect("get") {
                if current.status == DownloadStatus::Running && part_path.exists() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job never started running");

    scheduler.cancel(job.id).await.expect("cancel");

    let cancelled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(current) = scheduler.get(job.id).await.expect("get") {
                if current.status == DownloadStatus::Cancelled {
                    return current;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job did not cancel within the abort window");

    assert_eq!(cancelled.status, DownloadStatus::Cancelled);
    assert!(!part_path.exists(), "partial file must be removed on cancel");

    // Cancel again: idempotent, no error, no second event.
    scheduler.cancel(job.id).await.expect("second cancel is a no-op");

    let mut cancelled_status_events = 0;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        if let EventKind::DownloadStatus { job_id, status } = event.kind {
            if job_id == job.id && status == DownloadStatus::Cancelled {
                cancelled_status_events += 1;
            }
        }
    }
    assert_eq!(cancelled_status_events, 1, "exactly one cancelled status event");

    let _ = shutdown_tx.send(true);
}
