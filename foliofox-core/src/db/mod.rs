//! The SQLite-backed repositories each component owns. No module
//! outside `db` writes SQL directly — callers go through the typed
//! repository methods here.

pub mod books;
pub mod downloads;
pub mod health;
pub mod indexers;
pub mod preferences;
pub mod search_cache;
pub mod users;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::CoreResult;

pub type DbPool = SqlitePool;

/// Open (creating if absent) the single embedded SQLite database and
/// run pending migrations: connect, migrate, hand back a ready pool.
pub async fn connect_and_migrate(path: &Path) -> CoreResult<DbPool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
