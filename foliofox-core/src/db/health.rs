//! Exclusively owned by the Health Monitor.

use chrono::{DateTime, Utc};
use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::{IndexerHealth, IndexerStatus};
use sqlx::Row;

use crate::error::CoreResult;

use super::DbPool;

pub struct HealthRepository {
    pool: DbPool,
}

impl HealthRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, health: &IndexerHealth) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_health (
                indexer_id, status, last_check, latency_ms, consecutive_failures, last_error
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(indexer_id) DO UPDATE SET
                status = excluded.status,
                last_check = excluded.last_check,
                latency_ms = excluded.latency_ms,
                consecutive_failures = excluded.consecutive_failures,
                last_error = excluded.last_error
            "#,
        )
        .bind(health.indexer_id.as_uuid().to_string())
        .bind(health.status.as_str())
        .bind(health.last_check.to_rfc3339())
        .bind(health.latency_ms.map(|v| v as i64))
        .bind(health.consecutive_failures as i64)
        .bind(&health.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, indexer_id: IndexerId) -> CoreResult<Option<IndexerHealth>> {
        let row = sqlx::query("SELECT * FROM indexer_health WHERE indexer_id = ?")
            .bind(indexer_id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_health).transpose()
    }

    pub async fn list_all(&self) -> CoreResult<Vec<IndexerHealth>> {
        let rows = sqlx::query("SELECT * FROM indexer_health")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_health).collect()
    }
}

fn row_to_health(row: &sqlx::sqlite::SqliteRow) -> CoreResult<IndexerHealth> {
    let indexer_id: String = row.try_get("indexer_id")?;
    let status: String = row.try_get("status")?;
    let last_check: String = row.try_get("last_check")?;
    let latency_ms: Option<i64> = row.try_get("latency_ms")?;

    Ok(IndexerHealth {
        indexer_id: IndexerId::from_uuid(
            uuid::Uuid::parse_str(&indexer_id)
                .map_err(|e| crate::error::CoreError::other(e.to_string()))?,
        ),
        status: match status.as_str() {
            "healthy" => IndexerStatus::Healthy,
            "degraded" => IndexerStatus::Degraded,
            _ => IndexerStatus::Down,
        },
        last_check: DateTime::parse_from_rfc3339(&last_check)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        latency_ms: latency_ms.map(|v| v as u32),
        consecutive_failures: row.try_get::<i64, _>("consecutive_failures")? as u32,
        last_error: row.try_get("last_error")?,
    })
}
