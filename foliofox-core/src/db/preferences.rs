//! `user_preferences`: per-user default search filters and indexer
//! blocklist.

use foliofox_model::ids::UserId;
use foliofox_model::user::UserPreferences;
use sqlx::Row;

use crate::error::{CoreError, CoreResult};

use super::DbPool;

pub struct PreferencesRepository {
    pool: DbPool,
}

impl PreferencesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: UserId) -> CoreResult<UserPreferences> {
        let row = sqlx::query("SELECT preferences_json FROM user_preferences WHERE user_id = ?")
            .bind(user_id.as_uuid().to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.try_get("preferences_json")?;
                serde_json::from_str(&json)
                    .map_err(|e| CoreError::other(format!("corrupt user preferences: {e}")))
            }
            None => Ok(UserPreferences::default()),
        }
    }

    pub async fn put(&self, user_id: UserId, preferences: &UserPreferences) -> CoreResult<()> {
        let json = serde_json::to_string(preferences)
            .map_err(|e| CoreError::other(format!("failed to serialize preferences: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, preferences_json) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET preferences_json = excluded.preferences_json
            "#,
        )
        .bind(user_id.as_uuid().to_string())
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
