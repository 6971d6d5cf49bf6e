//! Owned exclusively by the Search Engine: `search_cache` and
//! `search_history`.

use chrono::{DateTime, Utc};
use foliofox_model::ids::UserId;
use foliofox_model::search::{SearchCacheEntry, SearchResult};
use sqlx::Row;

use crate::error::{CoreError, CoreResult};

use super::DbPool;

pub struct SearchCacheRepository {
    pool: DbPool,
}

impl SearchCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Last-writer-wins on fingerprint.
    pub async fn put(&self, entry: &SearchCacheEntry) -> CoreResult<()> {
        let serialized = serde_json::to_string(&entry.results)
            .map_err(|e| CoreError::other(format!("failed to serialize search results: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO search_cache (fingerprint, serialized_results, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                serialized_results = excluded.serialized_results,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(serialized)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reads a non-expired entry, lazily deleting it if expired.
    pub async fn get_fresh(&self, fingerprint: &str) -> CoreResult<Option<SearchCacheEntry>> {
        let row = sqlx::query("SELECT * FROM search_cache WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.try_get("expires_at")?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        if Utc::now() >= expires_at {
            self.delete(fingerprint).await?;
            return Ok(None);
        }

        let created_at: String = row.try_get("created_at")?;
        let serialized: String = row.try_get("serialized_results")?;
        let results: Vec<SearchResult> = serde_json::from_str(&serialized)
            .map_err(|e| CoreError::other(format!("corrupt search cache entry: {e}")))?;

        Ok(Some(SearchCacheEntry {
            fingerprint: fingerprint.to_string(),
            results,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            expires_at,
        }))
    }

    pub async fn delete(&self, fingerprint: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM search_cache WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// TTL sweeper: deletes every entry whose `expires_at` has passed,
    /// independent of any read.
    pub async fn sweep_expired(&self) -> CoreResult<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("DELETE FROM search_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn append_history(
        &self,
        fingerprint: &str,
        user_id: UserId,
        query: &str,
        result_count: usize,
        cache_hit: bool,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO search_history (fingerprint, user_id, query, created_at, result_count, cache_hit)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fingerprint)
        .bind(user_id.as_uuid().to_string())
        .bind(query)
        .bind(Utc::now().to_rfc3339())
        .bind(result_count as i64)
        .bind(cache_hit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
