//! The Download Scheduler: admission, deficit round-robin fairness,
//! concurrency caps, retry backoff, and the per-job worker lifecycle.
//!
//! One task owns all mutable scheduling state and is driven exclusively
//! through a command channel plus a worker-completion channel,
//! `tokio::select!`-ed alongside a periodic scheduling tick — needed
//! because retryable jobs become ready purely by the clock via
//! `nextRetryAt`, not by an external event.

pub mod backoff;
pub mod fairness;
pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use foliofox_config::models::DownloadsConfig;
use foliofox_model::download::{DownloadHistoryEntry, DownloadJob, DownloadStatus};
use foliofox_model::error::DomainError;
use foliofox_model::event::{AlertLevel, Event, EventKind};
use foliofox_model::ids::{IndexerId, JobId, UserId};

use crate::db::downloads::DownloadRepository;
use crate::db::users::UserRepository;
use crate::error::{CoreError, CoreResult};
use crate::events::EventBus;
use crate::organize::{self, FileOrganizer};
use crate::registry::Registry;

use fairness::DeficitTable;
use worker::{WorkerContext, WorkerOutcome, WorkerReport};

const SCHEDULE_TICK: Duration = Duration::from_millis(250);
const COMMAND_BUFFER: usize = 256;
const WORKER_REPORT_BUFFER: usize = 64;
/// Per-indexer cap fallback when an indexer's own config is unavailable.
const DEFAULT_INDEXER_CONCURRENCY: u32 = 2;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent: usize,
    pub retry_count: u32,
    pub timeout: Duration,
    pub download_path: PathBuf,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl From<&DownloadsConfig> for SchedulerConfig {
    fn from(cfg: &DownloadsConfig) -> Self {
        Self {
            max_concurrent: cfg.max_concurrent,
            retry_count: cfg.retry_count,
            timeout: cfg.timeout,
            download_path: cfg.download_path.clone(),
            base_retry_delay: cfg.base_retry_delay,
            max_retry_delay: cfg.max_retry_delay,
        }
    }
}

enum Command {
    Submit(DownloadJob, oneshot::Sender<CoreResult<()>>),
    Cancel(JobId, oneshot::Sender<CoreResult<()>>),
    Pause(JobId, oneshot::Sender<CoreResult<()>>),
    Resume(JobId, oneshot::Sender<CoreResult<()>>),
    Get(JobId, oneshot::Sender<Option<DownloadJob>>),
    ListForUser(UserId, Option<DownloadStatus>, oneshot::Sender<Vec<DownloadJob>>),
}

/// Front handle for the scheduler actor. Cheap to clone (a `Sender` is
/// an `Arc` internally), mirroring `JobQueueHandle`.
#[derive(Clone)]
pub struct Scheduler {
    command_tx: mpsc::Sender<Command>,
    download_path: PathBuf,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish()
    }
}

impl Scheduler {
    /// Spawns the actor task and returns a handle to it. Crash recovery
    /// (demoting `running` → `queued`) happens as the actor's first
    /// step, before it starts accepting commands.
    pub fn spawn(
        config: SchedulerConfig,
        repo: Arc<DownloadRepository>,
        user_repo: Arc<UserRepository>,
        registry: Registry,
        events: EventBus,
        organizer: Arc<dyn FileOrganizer>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (report_tx, report_rx) = mpsc::channel(WORKER_REPORT_BUFFER);
        let download_path = config.download_path.clone();

        let worker_ctx = Arc::new(WorkerContext {
            registry: registry.clone(),
            events: events.clone(),
            organizer,
        });

        let actor = Actor {
            config,
            repo,
            user_repo,
            worker_ctx,
            command_rx,
            report_tx,
            report_rx,
            events,
            jobs: HashMap::new(),
            running_per_indexer: HashMap::new(),
            cancel_signals: HashMap::new(),
            pending_stop: HashMap::new(),
            deficits: DeficitTable::new(),
            shutdown,
            registry,
        };
        tokio::spawn(actor.run());

        Self {
            command_tx,
            download_path,
        }
    }

    /// Builds a fresh job (queued, `.part` target path under the
    /// configured download root) and submits it.
    pub async fn submit(
        &self,
        user_id: UserId,
        indexer_id: IndexerId,
        download_url: String,
        title: String,
        format: String,
        file_size_bytes: Option<u64>,
        priority: i32,
    ) -> CoreResult<DownloadJob> {
        let target_path = organize::default_target_path(&self.download_path, &title, &format);
        let job = DownloadJob::new(
            user_id,
            indexer_id,
            download_url,
            title,
            format,
            file_size_bytes,
            priority,
            target_path.to_string_lossy().to_string(),
        );
        self.send(|tx| Command::Submit(job.clone(), tx)).await??;
        Ok(job)
    }

    pub async fn cancel(&self, job_id: JobId) -> CoreResult<()> {
        self.send(|tx| Command::Cancel(job_id, tx)).await?
    }

    pub async fn pause(&self, job_id: JobId) -> CoreResult<()> {
        self.send(|tx| Command::Pause(job_id, tx)).await?
    }

    pub async fn resume(&self, job_id: JobId) -> CoreResult<()> {
        self.send(|tx| Command::Resume(job_id, tx)).await?
    }

    pub async fn get(&self, job_id: JobId) -> CoreResult<Option<DownloadJob>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Get(job_id, tx))
            .await
            .map_err(|_| CoreError::other("scheduler actor is not running"))?;
        rx.await.map_err(|_| CoreError::other("scheduler actor dropped the response"))
    }

    pub async fn list_for_user(&self, user_id: UserId, status: Option<DownloadStatus>) -> CoreResult<Vec<DownloadJob>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::ListForUser(user_id, status, tx))
            .await
            .map_err(|_| CoreError::other("scheduler actor is not running"))?;
        rx.await.map_err(|_| CoreError::other("scheduler actor dropped the response"))
    }

    async fn send<F>(&self, make: F) -> CoreResult<CoreResult<()>>
    where
        F: FnOnce(oneshot::Sender<CoreResult<()>>) -> Command,
    {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| CoreError::other("scheduler actor is not running"))?;
        Ok(rx
            .await
            .map_err(|_| CoreError::other("scheduler actor dropped the response"))?)
    }
}

struct Actor {
    config: SchedulerConfig,
    repo: Arc<DownloadRepository>,
    user_repo: Arc<UserRepository>,
    registry: Registry,
    events: EventBus,
    worker_ctx: Arc<WorkerContext>,
    command_rx: mpsc::Receiver<Command>,
    report_tx: mpsc::Sender<WorkerReport>,
    report_rx: mpsc::Receiver<WorkerReport>,
    jobs: HashMap<JobId, DownloadJob>,
    running_per_indexer: HashMap<IndexerId, usize>,
    cancel_signals: HashMap<JobId, watch::Sender<bool>>,
    /// What status a job should land in once its worker reports
    /// `Cancelled` — distinguishes an explicit `Cancel` from a `Pause`,
    /// which reuses the same in-flight abort mechanism.
    pending_stop: HashMap<JobId, DownloadStatus>,
    deficits: DeficitTable,
    shutdown: watch::Receiver<bool>,
}

impl Actor {
    async fn run(mut self) {
        self.recover().await;
        let mut schedule_tick = tokio::time::interval(SCHEDULE_TICK);

        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                    self.schedule().await;
                }
                Some(report) = self.report_rx.recv() => {
                    self.handle_worker_report(report).await;
                    self.schedule().await;
                }
                _ = schedule_tick.tick() => {
                    self.schedule().await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                else => break,
            }
        }
    }

    /// Crash recovery: a `running` row on startup means the process
    /// died mid-download, so it's demoted
    /// back to `queued` and re-admitted through the normal scheduling
    /// path rather than assumed complete.
    async fn recover(&mut self) {
        let non_terminal = match self.repo.list_non_terminal().await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(error = %err, "failed to load non-terminal downloads on startup");
                return;
            }
        };
        for mut job in non_terminal {
            if job.status == DownloadStatus::Running {
                job.status = DownloadStatus::Queued;
                job.next_retry_at = None;
                if let Err(err) = self.repo.save(&job).await {
                    warn!(job_id = %job.id, error = %err, "failed to persist crash-recovery demotion");
                }
            }
            self.jobs.insert(job.id, job);
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(job, respond) => {
                if let Err(err) = self.user_repo.ensure(job.user_id).await {
                    let _ = respond.send(Err(err));
                    return;
                }
                let result = self.repo.insert(&job).await;
                if let Err(err) = result {
                    let _ = respond.send(Err(err));
                    return;
                }
                self.jobs.insert(job.id, job);
                let _ = respond.send(Ok(()));
            }
            Command::Cancel(job_id, respond) => {
                let _ = respond.send(self.cancel_job(job_id).await);
            }
            Command::Pause(job_id, respond) => {
                let _ = respond.send(self.pause_job(job_id).await);
            }
            Command::Resume(job_id, respond) => {
                let _ = respond.send(self.resume_job(job_id).await);
            }
            Command::Get(job_id, respond) => {
                let _ = respond.send(self.jobs.get(&job_id).cloned());
            }
            Command::ListForUser(user_id, status, respond) => {
                let mut jobs: Vec<DownloadJob> = self
                    .jobs
                    .values()
                    .filter(|job| job.user_id == user_id)
                    .filter(|job| status.map(|s| s == job.status).unwrap_or(true))
                    .cloned()
                    .collect();
                jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let _ = respond.send(jobs);
            }
        }
    }

    /// Idempotent: cancelling an already terminal job is a no-op
    /// success, not an error.
    async fn cancel_job(&mut self, job_id: JobId) -> CoreResult<()> {
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return Err(CoreError::other("download job not found"));
        };
        if job.status.is_terminal() {
            return Ok(());
        }
        if job.status == DownloadStatus::Running {
            self.pending_stop.insert(job_id, DownloadStatus::Cancelled);
            if let Some(signal) = self.cancel_signals.get(&job_id) {
                let _ = signal.send(true);
            }
            return Ok(());
        }
        self.transition(job_id, DownloadStatus::Cancelled, None).await
    }

    async fn pause_job(&mut self, job_id: JobId) -> CoreResult<()> {
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return Err(CoreError::other("download job not found"));
        };
        match job.status {
            DownloadStatus::Queued => self.transition(job_id, DownloadStatus::Paused, None).await,
            DownloadStatus::Running => {
                self.pending_stop.insert(job_id, DownloadStatus::Paused);
                if let Some(signal) = self.cancel_signals.get(&job_id) {
                    let _ = signal.send(true);
                }
                Ok(())
            }
            DownloadStatus::Paused => Ok(()),
            _ => Err(CoreError::other("cannot pause a job in this state")),
        }
    }

    async fn resume_job(&mut self, job_id: JobId) -> CoreResult<()> {
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return Err(CoreError::other("download job not found"));
        };
        if job.status != DownloadStatus::Paused {
            return Err(CoreError::other("cannot resume a job that isn't paused"));
        }
        self.transition(job_id, DownloadStatus::Queued, None).await
    }

    async fn transition(&mut self, job_id: JobId, status: DownloadStatus, last_error: Option<String>) -> CoreResult<()> {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return Err(CoreError::other("download job not found"));
        };
        job.status = status;
        if last_error.is_some() {
            job.last_error = last_error;
        }
        if status == DownloadStatus::Queued {
            job.next_retry_at = None;
        }
        let snapshot = job.clone();
        self.repo.save(&snapshot).await?;
        self.events.publish_to_user(
            snapshot.user_id,
            Event::for_user(
                snapshot.user_id,
                EventKind::DownloadStatus {
                    job_id: snapshot.id,
                    status: snapshot.status,
                },
            ),
        );
        Ok(())
    }

    async fn handle_worker_report(&mut self, report: WorkerReport) {
        let job_id = report.job_id;
        self.cancel_signals.remove(&job_id);
        let Some(job) = self.jobs.get(&job_id).cloned() else {
            return;
        };
        if let Some(indexer_count) = self.running_per_indexer.get_mut(&job.indexer_id) {
            *indexer_count = indexer_count.saturating_sub(1);
        }
        let pending_stop = self.pending_stop.remove(&job_id);

        match report.outcome {
            WorkerOutcome::Completed { total_bytes } => self.complete_job(job_id, total_bytes).await,
            WorkerOutcome::Cancelled => {
                let status = pending_stop.unwrap_or(DownloadStatus::Cancelled);
                if status == DownloadStatus::Paused {
                    let _ = self.transition(job_id, DownloadStatus::Paused, None).await;
                } else {
                    let _ = self.transition(job_id, DownloadStatus::Cancelled, None).await;
                    self.archive(job_id, DownloadStatus::Cancelled).await;
                }
            }
            WorkerOutcome::Failed { error } => self.fail_job(job_id, error).await,
        }
    }

    async fn complete_job(&mut self, job_id: JobId, total_bytes: u64) {
        let Some(job) = self.jobs.get_mut(&job_id) else { return };
        job.status = DownloadStatus::Completed;
        job.bytes_downloaded = total_bytes;
        job.completed_at = Some(Utc::now());
        let snapshot = job.clone();
        if let Err(err) = self.repo.save(&snapshot).await {
            warn!(job_id = %job_id, error = %err, "failed to persist completed download");
        }
        self.events.publish_to_user(
            snapshot.user_id,
            Event::for_user(
                snapshot.user_id,
                EventKind::DownloadCompleted {
                    job_id: snapshot.id,
                    target_path: snapshot.target_path.clone(),
                },
            ),
        );
        self.archive(job_id, DownloadStatus::Completed).await;
    }

    async fn fail_job(&mut self, job_id: JobId, error: DomainError) {
        let retryable = error.is_retryable();
        // Local-resource failures and worker panics are never retryable
        // (see is_retryable), so they always fall through to the
        // permanent-failure branch below, which is where this alert is
        // raised.
        let alert = match &error {
            DomainError::LocalResource(_) => Some((
                AlertLevel::Critical,
                format!("local resource failure on job {job_id}: {error}"),
            )),
            DomainError::Internal(_) => Some((AlertLevel::Error, format!("download job {job_id} failed: {error}"))),
            _ => None,
        };

        let Some(job) = self.jobs.get_mut(&job_id) else { return };
        job.last_error = Some(error.to_string());

        // attempts is incremented once per admitted try (see admit()),
        // so it never exceeds maxRetries.
        let exhausted = job.attempts >= self.config.retry_count;

        if retryable && !exhausted {
            job.status = DownloadStatus::Queued;
            let delay = backoff::compute(job.attempts, self.config.base_retry_delay, self.config.max_retry_delay);
            job.next_retry_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
            let snapshot = job.clone();
            if let Err(err) = self.repo.save(&snapshot).await {
                warn!(job_id = %job_id, error = %err, "failed to persist retry schedule");
            }
            debug!(job_id = %job_id, attempts = snapshot.attempts, delay_ms = delay.as_millis(), "download scheduled for retry");
            return;
        }

        job.status = DownloadStatus::Failed;
        let snapshot = job.clone();
        if let Err(err) = self.repo.save(&snapshot).await {
            warn!(job_id = %job_id, error = %err, "failed to persist failed download");
        }
        let can_retry = snapshot.can_retry(self.config.retry_count);
        self.events.publish_to_user(
            snapshot.user_id,
            Event::for_user(
                snapshot.user_id,
                EventKind::DownloadFailed {
                    job_id: snapshot.id,
                    last_error: snapshot.last_error.clone().unwrap_or_default(),
                    attempts: snapshot.attempts,
                    can_retry,
                },
            ),
        );
        if let Some((level, message)) = alert {
            self.events.publish_broadcast(Event::broadcast(EventKind::SystemAlert { level, message }));
        }
        self.archive(job_id, DownloadStatus::Failed).await;
    }

    async fn archive(&mut self, job_id: JobId, final_status: DownloadStatus) {
        let Some(job) = self.jobs.get(&job_id) else { return };
        let entry = DownloadHistoryEntry {
            job_id,
            final_status,
            attempts: job.attempts,
            total_bytes: job.bytes_downloaded,
            duration_ms: job
                .started_at
                .and_then(|started| {
                    job.completed_at
                        .map(|completed| (completed - started).num_milliseconds().max(0) as u64)
                })
                .unwrap_or(0),
            finished_at: Utc::now(),
        };
        if let Err(err) = self.repo.insert_history(&entry).await {
            warn!(job_id = %job_id, error = %err, "failed to persist download history entry");
        }
    }

    fn indexer_capacity(&self, indexer_id: IndexerId) -> usize {
        self.registry
            .indexer(indexer_id)
            .map(|indexer| indexer.max_concurrent_downloads)
            .unwrap_or(DEFAULT_INDEXER_CONCURRENCY) as usize
    }

    fn total_running(&self) -> usize {
        self.running_per_indexer.values().sum()
    }

    fn is_ready(&self, job: &DownloadJob) -> bool {
        job.status == DownloadStatus::Queued && job.next_retry_at.map(|at| at <= Utc::now()).unwrap_or(true)
    }

    fn is_admittable(&self, job: &DownloadJob) -> bool {
        self.is_ready(job) && self.running_per_indexer.get(&job.indexer_id).copied().unwrap_or(0) < self.indexer_capacity(job.indexer_id)
    }

    /// One full scheduling pass: admit jobs, highest-deficit user
    /// first, until the global cap or the
    /// admittable set is exhausted.
    async fn schedule(&mut self) {
        while self.total_running() < self.config.max_concurrent {
            let admittable_users: Vec<UserId> = {
                let mut users: Vec<UserId> = self
                    .jobs
                    .values()
                    .filter(|job| self.is_admittable(job))
                    .map(|job| job.user_id)
                    .collect();
                users.sort();
                users.dedup();
                users
            };
            if admittable_users.is_empty() {
                break;
            }

            self.deficits.accrue(&admittable_users);
            let Some(chosen_user) = self.deficits.pick_highest(&admittable_users) else {
                break;
            };

            let next_job_id = self
                .jobs
                .values()
                .filter(|job| job.user_id == chosen_user && self.is_admittable(job))
                .min_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)))
                .map(|job| job.id);

            let Some(job_id) = next_job_id else { break };
            self.deficits.charge(chosen_user, 1);
            self.admit(job_id).await;
        }
    }

    async fn admit(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get_mut(&job_id) else { return };
        job.status = DownloadStatus::Running;
        job.started_at = Some(Utc::now());
        job.bytes_downloaded = 0;
        job.attempts += 1;
        let snapshot = job.clone();

        if let Err(err) = self.repo.save(&snapshot).await {
            warn!(job_id = %job_id, error = %err, "failed to persist running transition");
        }
        *self.running_per_indexer.entry(snapshot.indexer_id).or_insert(0) += 1;

        self.events.publish_to_user(
            snapshot.user_id,
            Event::for_user(
                snapshot.user_id,
                EventKind::DownloadStatus {
                    job_id: snapshot.id,
                    status: DownloadStatus::Running,
                },
            ),
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel_signals.insert(job_id, cancel_tx);

        let worker_ctx = Arc::clone(&self.worker_ctx);
        let timeout = self.config.timeout;
        let report_tx = self.report_tx.clone();
        tokio::spawn(async move {
            // A separate join handle so a worker panic is caught here
            // instead of leaving the job stuck in `running` forever:
            // the actor never sees a report for a task that unwound.
            let handle = tokio::spawn(worker::run(worker_ctx, snapshot, timeout, cancel_rx));
            let report = match handle.await {
                Ok(report) => report,
                Err(join_err) => {
                    warn!(job_id = %job_id, panic = %join_err, "download worker task panicked");
                    WorkerReport {
                        job_id,
                        outcome: WorkerOutcome::Failed {
                            error: DomainError::Internal("<redacted>".to_string()),
                        },
                    }
                }
            };
            let _ = report_tx.send(report).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexer_capacity_falls_back_to_default() {
        let registry = Registry::new();
        let actor_like_capacity = registry
            .indexer(IndexerId::from_name("missing"))
            .map(|indexer| indexer.max_concurrent_downloads)
            .unwrap_or(DEFAULT_INDEXER_CONCURRENCY);
        assert_eq!(actor_like_capacity, DEFAULT_INDEXER_CONCURRENCY);
    }
}
