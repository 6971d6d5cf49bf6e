//! Post-download hook the Download Scheduler calls after a completed
//! job's file lands at its final path.
//!
//! A thin `async_trait` with a `Noop` impl for tests/minimal
//! deployments and a real impl that does the library-side work
//! FolioFox needs (move into the library tree, trigger a metadata
//! refresh) without the scheduler knowing any of those details.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use foliofox_model::download::DownloadJob;

use crate::db::books::{BookRecord, BookRepository};
use crate::error::CoreResult;

/// Reacts to a completed download. The job is already `completed` by
/// the time this runs, so errors here never fail the download itself —
/// a failing hook only gets logged.
#[async_trait]
pub trait FileOrganizer: Send + Sync {
    async fn organize(&self, job: &DownloadJob) -> CoreResult<()>;
}

/// For deployments that don't run a library import step, or for tests
/// that don't want filesystem side effects.
#[derive(Debug, Default)]
pub struct NoopFileOrganizer;

#[async_trait]
impl FileOrganizer for NoopFileOrganizer {
    async fn organize(&self, _job: &DownloadJob) -> CoreResult<()> {
        Ok(())
    }
}

/// Moves a completed download from its scheduler-owned `target_path`
/// into `library_root`, laid out as `<author>/<title>.<format>` (falling
/// back to `Unknown` when the indexer didn't supply an author), so a
/// downstream library scanner picks it up on its own schedule.
pub struct LibraryFileOrganizer {
    library_root: PathBuf,
    books: BookRepository,
}

impl LibraryFileOrganizer {
    pub fn new(library_root: PathBuf, books: BookRepository) -> Self {
        Self { library_root, books }
    }

    fn destination(&self, job: &DownloadJob) -> PathBuf {
        // DownloadJob carries no author field — the scheduler only
        // knows title/format, so everything lands under a flat
        // "Unknown" author bucket for a downstream scanner to re-sort
        // once it reads the file's own metadata.
        let file_name = format!("{}.{}", sanitize_path_segment(&job.title), job.format);
        self.library_root.join("Unknown").join(file_name)
    }
}

#[async_trait]
impl FileOrganizer for LibraryFileOrganizer {
    async fn organize(&self, job: &DownloadJob) -> CoreResult<()> {
        let destination = self.destination(job);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(&job.target_path, &destination).await {
            Ok(()) => {
                debug!(job_id = %job.id, path = %destination.display(), "organized into library");
                if let Err(err) = self
                    .books
                    .insert_organized(&BookRecord {
                        title: job.title.clone(),
                        author: None,
                        format: job.format.clone(),
                        path: destination.display().to_string(),
                        size_bytes: job.bytes_downloaded,
                    })
                    .await
                {
                    warn!(job_id = %job.id, error = %err, "failed to record organized book in library index");
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "failed to move completed download into library");
                Err(err.into())
            }
        }
    }
}

fn sanitize_path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if is_path_unsafe(c) { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_path_unsafe(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

pub fn default_target_path(download_root: &Path, title: &str, format: &str) -> PathBuf {
    download_root.join(format!("{}.{}.part", sanitize_path_segment(title), format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_model::ids::{IndexerId, UserId};

    fn sample_job() -> DownloadJob {
        DownloadJob::new(
            UserId::new(),
            IndexerId::from_name("test"),
            "https://example.com/book".to_string(),
            "Dune / Slash \\ Title".to_string(),
            "epub".to_string(),
            None,
            0,
            "/tmp/whatever.part".to_string(),
        )
    }

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_path_segment("a/b:c"), "a_b_c");
    }

    #[test]
    fn empty_segment_falls_back_to_unknown() {
        assert_eq!(sanitize_path_segment("///"), "Unknown");
    }

    #[tokio::test]
    async fn noop_organizer_always_succeeds() {
        let organizer = NoopFileOrganizer;
        assert!(organizer.organize(&sample_job()).await.is_ok());
    }

    #[tokio::test]
    async fn destination_sanitizes_title_for_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = crate::db::connect_and_migrate(&dir.path().join("test.db"))
            .await
            .expect("migrate");
        let organizer =
            LibraryFileOrganizer::new(PathBuf::from("/library"), crate::db::books::BookRepository::new(pool));
        let dest = organizer.destination(&sample_job());
        assert!(dest.starts_with("/library"));
        assert!(dest.to_string_lossy().contains("epub"));
    }
}
