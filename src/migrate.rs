use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            fingerprint TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            last_indexed_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='content_index'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        // rowid mirrors documents.id
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE content_index USING fts5(
                document_id UNINDEXED,
                filename,
                text,
                tokenize = 'porter unicode61'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_modified_at ON documents(modified_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
