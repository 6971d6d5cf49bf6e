//! The `books`/`book_files` tables. Exclusively owned by the
//! `FileOrganizer` hook — the scheduler never writes here directly.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::CoreResult;

use super::DbPool;

pub struct BookRecord {
    pub title: String,
    pub author: Option<String>,
    pub format: String,
    pub path: String,
    pub size_bytes: u64,
}

pub struct BookRepository {
    pool: DbPool,
}

impl BookRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts a `books` row plus its one `book_files` row. A given
    /// library path is organized exactly once by the scheduler, so this
    /// always creates new rows rather than upserting.
    pub async fn insert_organized(&self, record: &BookRecord) -> CoreResult<()> {
        let book_id = Uuid::now_v7().to_string();
        let file_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO books (id, title, author, created_at) VALUES (?, ?, ?, ?)")
            .bind(&book_id)
            .bind(&record.title)
            .bind(&record.author)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO book_files (id, book_id, format, path, size_bytes) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&file_id)
        .bind(&book_id)
        .bind(&record.format)
        .bind(&record.path)
        .bind(record.size_bytes as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_files_for_book(&self, book_id: &str) -> CoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM book_files WHERE book_id = ?")
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row.try_get::<String, _>("path").map_err(Into::into)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_organized_creates_book_and_file_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = crate::db::connect_and_migrate(&dir.path().join("test.db"))
            .await
            .expect("migrate");
        let repo = BookRepository::new(pool.clone());

        repo.insert_organized(&BookRecord {
            title: "Dune".to_string(),
            author: None,
            format: "epub".to_string(),
            path: "/library/Unknown/Dune.epub".to_string(),
            size_bytes: 1024,
        })
        .await
        .expect("insert");

        let row = sqlx::query("SELECT title FROM books")
            .fetch_one(&pool)
            .await
            .expect("book row");
        let title: String = row.try_get("title").unwrap();
        assert_eq!(title, "Dune");

        let row = sqlx::query("SELECT path, size_bytes FROM book_files")
            .fetch_one(&pool)
            .await
            .expect("book_files row");
        let path: String = row.try_get("path").unwrap();
        let size_bytes: i64 = row.try_get("size_bytes").unwrap();
        assert_eq!(path, "/library/Unknown/Dune.epub");
        assert_eq!(size_bytes, 1024);
    }
}
