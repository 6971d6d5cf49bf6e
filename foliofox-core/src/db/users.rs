//! The `users` table itself is owned by the out-of-scope authentication
//! collaborator (see spec.md §1); the acquisition pipeline only ever
//! references `user_id` foreign keys. `ensure` upserts a placeholder row
//! the first time this pipeline sees a user id it hasn't seen before, so
//! a request can never trip the `downloads`/`search_history`/
//! `user_preferences` foreign keys just because the owning collaborator
//! hasn't been wired in yet (tests, minimal deployments).

use foliofox_model::ids::UserId;

use crate::error::CoreResult;

use super::DbPool;

pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// No-op if a row for this id already exists (real deployments: the
    /// auth collaborator created it already).
    pub async fn ensure(&self, user_id: UserId) -> CoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO users (id, username) VALUES (?, ?)")
            .bind(user_id.as_uuid().to_string())
            .bind(user_id.as_uuid().to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = crate::db::connect_and_migrate(&dir.path().join("users.db"))
            .await
            .expect("migrate test db");
        let repo = UserRepository::new(pool);
        let user_id = UserId::new();
        repo.ensure(user_id).await.expect("first ensure");
        repo.ensure(user_id).await.expect("second ensure is a no-op");
    }
}
