//! Per-job download worker. One task per running job, spawned by
//! `Scheduler::admit`, reporting back over `report_tx` when it's done
//! so the actor loop can free the job's concurrency slots and decide
//! the next transition.
//!
//! Streams to a `.part` file, tracks an EWMA throughput estimate, and
//! throttles progress notifications instead of emitting one per chunk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use foliofox_model::download::DownloadJob;
use foliofox_model::error::DomainError;
use foliofox_model::event::{Event, EventKind};
use foliofox_model::ids::JobId;

use crate::events::EventBus;
use crate::organize::FileOrganizer;
use crate::registry::Registry;

/// Progress is only emitted at most this often...
const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(500);
/// ...or when downloaded bytes cross this percentage boundary, whichever
/// comes first.
const PROGRESS_PERCENT_STEP: u64 = 1;
/// EWMA throughput window: speed is averaged over a 5s window.
const SPEED_WINDOW: Duration = Duration::from_secs(5);

pub enum WorkerOutcome {
    Completed { total_bytes: u64 },
    Cancelled,
    Failed { error: DomainError },
}

pub struct WorkerReport {
    pub job_id: JobId,
    pub outcome: WorkerOutcome,
}

pub struct WorkerContext {
    pub registry: Registry,
    pub events: EventBus,
    pub organizer: Arc<dyn FileOrganizer>,
}

/// Runs one job to completion, cancellation, or failure. Never panics
/// on a download error — every failure mode is reported back as a
/// `WorkerOutcome` for the actor loop to act on.
///
/// Cancellation rides a `watch` channel rather than `Notify`: `watch`
/// remembers its last value, so a stop signal sent a moment before the
/// worker re-enters its select loop is never lost the way a bare
/// `Notify::notify_waiters` call would be.
pub async fn run(ctx: Arc<WorkerContext>, job: DownloadJob, timeout: Duration, mut cancel: watch::Receiver<bool>) -> WorkerReport {
    let job_id = job.id;
    let outcome = run_inner(&ctx, &job, timeout, &mut cancel).await;
    WorkerReport { job_id, outcome }
}

async fn run_inner(ctx: &WorkerContext, job: &DownloadJob, timeout: Duration, cancel: &mut watch::Receiver<bool>) -> WorkerOutcome {
    let deadline = Instant::now() + timeout;
    let mut stream = match ctx.registry.fetch(job.indexer_id, &job.download_url, deadline).await {
        Ok(stream) => stream,
        Err(err) => return WorkerOutcome::Failed { error: err },
    };

    let part_path = PathBuf::from(&job.target_path);
    let mut file = match tokio::fs::File::create(&part_path).await {
        Ok(file) => file,
        Err(err) => return WorkerOutcome::Failed { error: DomainError::LocalResource(err.to_string()) },
    };

    let mut progress = ProgressTracker::new(job.file_size_bytes);
    let mut last_emit = Instant::now() - PROGRESS_MIN_INTERVAL;
    let mut last_emit_percent: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.changed() => {
                drop(file);
                let _ = tokio::fs::remove_file(&part_path).await;
                return WorkerOutcome::Cancelled;
            }

            chunk = stream.next() => {
                let Some(chunk) = chunk else { break };
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = tokio::fs::remove_file(&part_path).await;
                        return WorkerOutcome::Failed { error: err };
                    }
                };
                if let Err(err) = file.write_all(&bytes).await {
                    let _ = tokio::fs::remove_file(&part_path).await;
                    return WorkerOutcome::Failed { error: DomainError::LocalResource(err.to_string()) };
                }
                progress.record(bytes.len() as u64);

                if progress.should_emit(&mut last_emit, &mut last_emit_percent) {
                    ctx.events.publish_to_user(
                        job.user_id,
                        Event::for_user(
                            job.user_id,
                            EventKind::DownloadProgressUpdate {
                                job_id: job.id,
                                bytes_downloaded: progress.bytes_downloaded,
                                total_bytes: progress.total_bytes,
                                speed_bps: progress.speed_bps,
                                eta_seconds: progress.eta_seconds(),
                            },
                        ),
                    );
                }
            }
        }
    }

    if let Err(err) = file.flush().await {
        let _ = tokio::fs::remove_file(&part_path).await;
        return WorkerOutcome::Failed { error: DomainError::LocalResource(err.to_string()) };
    }
    drop(file);

    let final_path = final_path_for(&part_path);
    if let Err(err) = tokio::fs::rename(&part_path, &final_path).await {
        return WorkerOutcome::Failed { error: DomainError::LocalResource(err.to_string()) };
    }

    let mut organized_job = job.clone();
    organized_job.target_path = final_path.to_string_lossy().to_string();
    if let Err(err) = ctx.organizer.organize(&organized_job).await {
        warn!(job_id = %job.id, error = %err, "FileOrganizer hook failed; download stays completed");
    }

    debug!(job_id = %job.id, bytes = progress.bytes_downloaded, "download completed");
    WorkerOutcome::Completed {
        total_bytes: progress.bytes_downloaded,
    }
}

/// Strips a trailing `.part` suffix if present, otherwise appends
/// nothing — `target_path` is always suffixed with `.part` by the
/// scheduler on admission.
fn final_path_for(part_path: &std::path::Path) -> PathBuf {
    match part_path.to_string_lossy().strip_suffix(".part") {
        Some(stripped) => PathBuf::from(stripped),
        None => part_path.to_path_buf(),
    }
}

struct ProgressTracker {
    bytes_downloaded: u64,
    total_bytes: Option<u64>,
    speed_bps: f64,
    window_started: Instant,
    window_bytes: u64,
}

impl ProgressTracker {
    fn new(total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded: 0,
            total_bytes,
            speed_bps: 0.0,
            window_started: Instant::now(),
            window_bytes: 0,
        }
    }

    fn record(&mut self, chunk_len: u64) {
        self.bytes_downloaded += chunk_len;
        self.window_bytes += chunk_len;

        let elapsed = self.window_started.elapsed();
        if elapsed >= SPEED_WINDOW {
            let instantaneous = self.window_bytes as f64 / elapsed.as_secs_f64();
            // EWMA smoothing across windows rather than a flat reset,
            // so one quiet window doesn't make `etaSeconds` jump.
            self.speed_bps = 0.5 * instantaneous + 0.5 * self.speed_bps;
            self.window_started = Instant::now();
            self.window_bytes = 0;
        } else if self.speed_bps == 0.0 && elapsed > Duration::ZERO {
            self.speed_bps = self.window_bytes as f64 / elapsed.as_secs_f64();
        }
    }

    fn eta_seconds(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if self.speed_bps <= 0.0 || total <= self.bytes_downloaded {
            return None;
        }
        Some(((total - self.bytes_downloaded) as f64 / self.speed_bps).ceil() as u64)
    }

    fn current_percent(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if total == 0 {
            return None;
        }
        Some((self.bytes_downloaded * 100) / total)
    }

    /// Throttle: at most once per 500ms, or immediately on crossing a
    /// 1% boundary.
    fn should_emit(&self, last_emit: &mut Instant, last_emit_percent: &mut u64) -> bool {
        let now = Instant::now();
        let time_elapsed = now.duration_since(*last_emit) >= PROGRESS_MIN_INTERVAL;
        let percent_crossed = match self.current_percent() {
            Some(percent) => percent >= *last_emit_percent + PROGRESS_PERCENT_STEP,
            None => false,
        };
        if time_elapsed || percent_crossed {
            *last_emit = now;
            if let Some(percent) = self.current_percent() {
                *last_emit_percent = percent;
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_is_none_without_total_bytes() {
        let tracker = ProgressTracker::new(None);
        assert_eq!(tracker.eta_seconds(), None);
    }

    #[test]
    fn percent_boundary_triggers_emit_even_within_throttle_window() {
        let mut tracker = ProgressTracker::new(Some(100));
        tracker.record(50);
        let mut last_emit = Instant::now();
        let mut last_emit_percent = 0;
        assert!(tracker.should_emit(&mut last_emit, &mut last_emit_percent));
        assert_eq!(last_emit_percent, 50);
    }

    #[test]
    fn no_emit_without_elapsed_time_or_percent_change() {
        let tracker = ProgressTracker::new(Some(100));
        let mut last_emit = Instant::now();
        let mut last_emit_percent = 0;
        assert!(!tracker.should_emit(&mut last_emit, &mut last_emit_percent));
    }

    #[test]
    fn final_path_strips_part_suffix() {
        let p = PathBuf::from("/tmp/book.epub.part");
        assert_eq!(final_path_for(&p), PathBuf::from("/tmp/book.epub"));
    }
}
