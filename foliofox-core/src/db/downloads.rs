//! The `downloads` and `download_history` tables. The Download
//! Scheduler is the sole writer of row transitions here; this
//! repository is the durable log underneath its in-memory job table.

use chrono::{DateTime, Utc};
use foliofox_model::download::{DownloadHistoryEntry, DownloadJob, DownloadStatus};
use foliofox_model::ids::{IndexerId, JobId, UserId};
use sqlx::Row;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

use super::DbPool;

pub struct DownloadRepository {
    pool: DbPool,
}

impl DownloadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, job: &DownloadJob) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (
                id, user_id, indexer_id, download_url, title, format, file_size_bytes,
                priority, status, attempts, next_retry_at, created_at, started_at,
                completed_at, last_error, bytes_downloaded, speed_bps, eta_seconds, target_path
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_uuid().to_string())
        .bind(job.user_id.as_uuid().to_string())
        .bind(job.indexer_id.as_uuid().to_string())
        .bind(&job.download_url)
        .bind(&job.title)
        .bind(&job.format)
        .bind(job.file_size_bytes.map(|v| v as i64))
        .bind(job.priority)
        .bind(job.status.as_str())
        .bind(job.attempts as i64)
        .bind(job.next_retry_at.map(|dt| dt.to_rfc3339()))
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|dt| dt.to_rfc3339()))
        .bind(job.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&job.last_error)
        .bind(job.bytes_downloaded as i64)
        .bind(job.speed_bps)
        .bind(job.eta_seconds.map(|v| v as i64))
        .bind(&job.target_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists a full snapshot of the job's mutable fields. The
    /// scheduler calls this after every state transition so the
    /// database never lags the in-memory table by more than one write.
    pub async fn save(&self, job: &DownloadJob) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE downloads SET
                status = ?, attempts = ?, next_retry_at = ?, started_at = ?,
                completed_at = ?, last_error = ?, bytes_downloaded = ?, speed_bps = ?,
                eta_seconds = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.attempts as i64)
        .bind(job.next_retry_at.map(|dt| dt.to_rfc3339()))
        .bind(job.started_at.map(|dt| dt.to_rfc3339()))
        .bind(job.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&job.last_error)
        .bind(job.bytes_downloaded as i64)
        .bind(job.speed_bps)
        .bind(job.eta_seconds.map(|v| v as i64))
        .bind(job.id.as_uuid().to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: JobId) -> CoreResult<Option<DownloadJob>> {
        let row = sqlx::query("SELECT * FROM downloads WHERE id = ?")
            .bind(id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    pub async fn list_for_user(
        &self,
        user_id: UserId,
        status: Option<DownloadStatus>,
    ) -> CoreResult<Vec<DownloadJob>> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM downloads WHERE user_id = ? AND status = ? ORDER BY created_at DESC")
                    .bind(user_id.as_uuid().to_string())
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM downloads WHERE user_id = ? ORDER BY created_at DESC")
                    .bind(user_id.as_uuid().to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_job).collect()
    }

    /// Rows with status `queued` or `running`, reloaded on process
    /// start for crash recovery.
    pub async fn list_non_terminal(&self) -> CoreResult<Vec<DownloadJob>> {
        let rows = sqlx::query("SELECT * FROM downloads WHERE status IN ('queued', 'running')")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn insert_history(&self, entry: &DownloadHistoryEntry) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO download_history (job_id, final_status, attempts, total_bytes, duration_ms, finished_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                final_status = excluded.final_status,
                attempts = excluded.attempts,
                total_bytes = excluded.total_bytes,
                duration_ms = excluded.duration_ms,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(entry.job_id.as_uuid().to_string())
        .bind(entry.final_status.as_str())
        .bind(entry.attempts as i64)
        .bind(entry.total_bytes as i64)
        .bind(entry.duration_ms as i64)
        .bind(entry.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> CoreResult<DownloadJob> {
    let parse_uuid = |s: String| -> CoreResult<uuid::Uuid> {
        uuid::Uuid::parse_str(&s).map_err(|e| CoreError::other(e.to_string()))
    };
    let parse_dt = |s: Option<String>| -> Option<DateTime<Utc>> {
        s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let indexer_id: String = row.try_get("indexer_id")?;
    let status: String = row.try_get("status")?;
    let file_size_bytes: Option<i64> = row.try_get("file_size_bytes")?;
    let eta_seconds: Option<i64> = row.try_get("eta_seconds")?;

    Ok(DownloadJob {
        id: JobId::from_uuid(parse_uuid(id)?),
        user_id: UserId::from_uuid(parse_uuid(user_id)?),
        indexer_id: IndexerId::from_uuid(parse_uuid(indexer_id)?),
        download_url: row.try_get("download_url")?,
        title: row.try_get("title")?,
        format: row.try_get("format")?,
        file_size_bytes: file_size_bytes.map(|v| v as u64),
        priority: row.try_get("priority")?,
        status: DownloadStatus::from_str(&status).map_err(CoreError::other)?,
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        next_retry_at: parse_dt(row.try_get("next_retry_at")?),
        created_at: parse_dt(Some(row.try_get("created_at")?)).unwrap_or_else(Utc::now),
        started_at: parse_dt(row.try_get("started_at")?),
        completed_at: parse_dt(row.try_get("completed_at")?),
        last_error: row.try_get("last_error")?,
        bytes_downloaded: row.try_get::<i64, _>("bytes_downloaded")? as u64,
        speed_bps: row.try_get("speed_bps")?,
        eta_seconds: eta_seconds.map(|v| v as u64),
        target_path: row.try_get("target_path")?,
    })
}
