//! Indexer configuration repository. Rows are created by admin config
//! actions; the registry and health monitor only read them.

use std::time::Duration;

use foliofox_model::ids::IndexerId;
use foliofox_model::indexer::{Indexer, IndexerKind};
use sqlx::Row;

use crate::error::CoreResult;

use super::DbPool;

pub struct IndexerRepository {
    pool: DbPool,
}

impl IndexerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, indexer: &Indexer) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO indexers (
                id, name, kind, base_url, api_key, enabled, priority,
                rate_limit_requests, rate_limit_window_secs, timeout_secs,
                max_concurrent_downloads
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(indexer.id.as_uuid().to_string())
        .bind(&indexer.name)
        .bind(indexer.kind.as_str())
        .bind(&indexer.base_url)
        .bind(&indexer.api_key)
        .bind(indexer.enabled)
        .bind(indexer.priority)
        .bind(indexer.rate_limit_requests as i64)
        .bind(indexer.rate_limit_window.as_secs() as i64)
        .bind(indexer.timeout.as_secs() as i64)
        .bind(indexer.max_concurrent_downloads as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_enabled(&self) -> CoreResult<Vec<Indexer>> {
        let rows = sqlx::query("SELECT * FROM indexers WHERE enabled = 1 ORDER BY priority DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_indexer).collect()
    }

    pub async fn list_all(&self) -> CoreResult<Vec<Indexer>> {
        let rows = sqlx::query("SELECT * FROM indexers ORDER BY priority DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_indexer).collect()
    }

    pub async fn get(&self, id: IndexerId) -> CoreResult<Option<Indexer>> {
        let row = sqlx::query("SELECT * FROM indexers WHERE id = ?")
            .bind(id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_indexer).transpose()
    }

    /// Used only to seed a `prowlarr`/`jackett` row from
    /// `config.{prowlarr,jackett}` on first boot — there is exactly one
    /// indexer of each of these kinds, keyed by `kind` rather than by
    /// name.
    pub async fn find_by_kind(&self, kind: IndexerKind) -> CoreResult<Option<Indexer>> {
        let row = sqlx::query("SELECT * FROM indexers WHERE kind = ? LIMIT 1")
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_indexer).transpose()
    }

    pub async fn set_enabled(&self, id: IndexerId, enabled: bool) -> CoreResult<()> {
        sqlx::query("UPDATE indexers SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id.as_uuid().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_indexer(row: &sqlx::sqlite::SqliteRow) -> CoreResult<Indexer> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let kind = match kind.as_str() {
        "prowlarr" => IndexerKind::Prowlarr,
        "jackett" => IndexerKind::Jackett,
        _ => IndexerKind::Direct,
    };
    let rate_limit_requests: i64 = row.try_get("rate_limit_requests")?;
    let rate_limit_window_secs: i64 = row.try_get("rate_limit_window_secs")?;
    let timeout_secs: i64 = row.try_get("timeout_secs")?;
    let max_concurrent_downloads: i64 = row.try_get("max_concurrent_downloads")?;

    Ok(Indexer {
        id: IndexerId::from_uuid(
            uuid::Uuid::parse_str(&id).map_err(|e| crate::error::CoreError::other(e.to_string()))?,
        ),
        name: row.try_get("name")?,
        kind,
        base_url: row.try_get("base_url")?,
        api_key: row.try_get("api_key")?,
        enabled: row.try_get("enabled")?,
        priority: row.try_get("priority")?,
        rate_limit_requests: rate_limit_requests as u32,
        rate_limit_window: Duration::from_secs(rate_limit_window_secs as u64),
        timeout: Duration::from_secs(timeout_secs as u64),
        max_concurrent_downloads: max_concurrent_downloads as u32,
    })
}
