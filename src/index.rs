//! Document index: document metadata plus an FTS5 body table.
//!
//! Two tables back the index. `documents` holds one metadata row per file
//! (filename, fingerprint, modification time) and `content_index` holds the
//! full text, keyed by the same integer id as its rowid. Metadata lookups
//! never touch the text table.
//!
//! # Query modes
//!
//! | Query | Behavior |
//! |-------|----------|
//! | empty / whitespace | most recently modified documents, newest first |
//! | text | prefix match of every token against filename and body, ranked by FTS5 relevance |

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::error::Result;
use crate::migrate;
use crate::models::{from_nanos, to_nanos, FileRef, SearchResult};

/// Characters of body text returned as the snippet in recent mode.
const RECENT_EXCERPT_CHARS: i64 = 160;

/// Tunables for [`DocumentIndex::search`].
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Number of documents returned for an empty query.
    pub recent_limit: i64,
    /// Token bound passed to the FTS5 `snippet()` function.
    pub snippet_tokens: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            recent_limit: 20,
            snippet_tokens: 10,
        }
    }
}

/// What [`DocumentIndex::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The exact version was already indexed.
    Unchanged,
    Inserted(i64),
    /// An existing row was refreshed in place; the id is preserved.
    Updated(i64),
}

/// SQLite-backed document index.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    pool: SqlitePool,
    options: SearchOptions,
}

impl DocumentIndex {
    /// Connects to (creating if needed) the database file and applies the schema.
    pub async fn open(db_path: &Path, options: SearchOptions) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        Self::from_pool(pool, options).await
    }

    pub async fn from_pool(pool: SqlitePool, options: SearchOptions) -> Result<Self> {
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool, options })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// True iff this exact `(filename, fingerprint, modified_at)` is indexed.
    ///
    /// Lookup failures answer `false` so the caller re-indexes.
    pub async fn is_unmodified(&self, file: &FileRef) -> bool {
        let result: std::result::Result<bool, sqlx::Error> = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE filename = ? AND fingerprint = ? AND modified_at = ?",
        )
        .bind(&file.filename)
        .bind(&file.fingerprint)
        .bind(to_nanos(file.modified_at))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(filename = %file.filename, error = %e, "unmodified lookup failed");
                false
            }
        }
    }

    /// Inserts or refreshes the rows for `file`.
    ///
    /// An existing filename keeps its document id; only the fingerprint,
    /// modification time and body change.
    pub async fn upsert(&self, file: &FileRef, content: &[u8]) -> Result<UpsertOutcome> {
        file.validate()?;

        if self.is_unmodified(file).await {
            return Ok(UpsertOutcome::Unchanged);
        }

        let body = String::from_utf8_lossy(content);
        let modified_at = to_nanos(file.modified_at);
        let indexed_at = to_nanos(Utc::now());

        let mut tx = self.pool.begin().await?;

        let existing_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM documents WHERE filename = ?")
                .bind(&file.filename)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing_id {
            None => {
                let doc_id = sqlx::query(
                    "INSERT INTO documents (filename, fingerprint, modified_at, last_indexed_at) VALUES (?, ?, ?, ?)",
                )
                .bind(&file.filename)
                .bind(&file.fingerprint)
                .bind(modified_at)
                .bind(indexed_at)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

                insert_text(&mut tx, doc_id, &file.filename, &body).await?;
                UpsertOutcome::Inserted(doc_id)
            }
            Some(doc_id) => {
                sqlx::query(
                    "UPDATE documents SET fingerprint = ?, modified_at = ?, last_indexed_at = ? WHERE id = ?",
                )
                .bind(&file.fingerprint)
                .bind(modified_at)
                .bind(indexed_at)
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM content_index WHERE rowid = ?")
                    .bind(doc_id)
                    .execute(&mut *tx)
                    .await?;
                insert_text(&mut tx, doc_id, &file.filename, &body).await?;
                UpsertOutcome::Updated(doc_id)
            }
        };

        tx.commit().await?;

        tracing::debug!(filename = %file.filename, ?outcome, "upserted document");
        Ok(outcome)
    }

    /// Runs a query; an empty query lists recently modified documents.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return self.recent().await;
        }

        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT d.id, d.filename, d.fingerprint, d.modified_at,
                   snippet(content_index, 2, '**', '**', '...', {}) AS snippet
            FROM content_index
            JOIN documents d ON d.id = content_index.rowid
            WHERE content_index MATCH ?
            ORDER BY rank
            "#,
            self.options.snippet_tokens
        );

        let rows = sqlx::query(&sql)
            .bind(&expression)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_result).collect())
    }

    async fn recent(&self) -> Result<Vec<SearchResult>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id, d.filename, d.fingerprint, d.modified_at,
                   COALESCE(substr(c.text, 1, ?), '') AS snippet
            FROM documents d
            LEFT JOIN content_index c ON c.rowid = d.id
            ORDER BY d.modified_at DESC, d.id DESC
            LIMIT ?
            "#,
        )
        .bind(RECENT_EXCERPT_CHARS)
        .bind(self.options.recent_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_result).collect())
    }

    /// Deletes metadata and text rows for `refs` in one transaction.
    ///
    /// References without a document id are resolved by filename. Returns
    /// the number of documents removed.
    pub async fn prune_file_refs(&self, refs: &[FileRef]) -> Result<u64> {
        if refs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;

        for file in refs {
            let doc_id = match file.document_id {
                Some(id) => Some(id),
                None => {
                    sqlx::query_scalar("SELECT id FROM documents WHERE filename = ?")
                        .bind(&file.filename)
                        .fetch_optional(&mut *tx)
                        .await?
                }
            };
            let Some(doc_id) = doc_id else { continue };

            sqlx::query("DELETE FROM content_index WHERE rowid = ?")
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;
            removed += sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(doc_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Metadata snapshot of every indexed document, ordered by filename.
    pub async fn get_all_file_refs(&self) -> Result<Vec<FileRef>> {
        let rows = sqlx::query(
            "SELECT id, filename, fingerprint, modified_at FROM documents ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_file_ref).collect())
    }

    pub async fn get_file_ref(&self, filename: &str) -> Result<Option<FileRef>> {
        let row = sqlx::query(
            "SELECT id, filename, fingerprint, modified_at FROM documents WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_file_ref))
    }

    /// Indexed body text for `filename`.
    pub async fn get_content(&self, filename: &str) -> Result<Option<String>> {
        let text = sqlx::query_scalar(
            "SELECT c.text FROM content_index c JOIN documents d ON d.id = c.rowid WHERE d.filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(text)
    }

    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn insert_text(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: i64,
    filename: &str,
    body: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO content_index (rowid, document_id, filename, text) VALUES (?, ?, ?, ?)",
    )
    .bind(doc_id)
    .bind(doc_id)
    .bind(filename)
    .bind(body)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Builds an FTS5 expression: every token quoted and prefix-matched,
/// ANDed, scoped to the filename and text columns.
///
/// Tokens without a letter or digit are dropped since the tokenizer
/// would treat them as separators anyway. `None` means nothing is left
/// to match.
pub(crate) fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        return None;
    }
    Some(format!("{{filename text}} : ({})", terms.join(" ")))
}

fn row_to_file_ref(row: &SqliteRow) -> FileRef {
    FileRef {
        document_id: Some(row.get("id")),
        filename: row.get("filename"),
        fingerprint: row.get("fingerprint"),
        modified_at: from_nanos(row.get("modified_at")),
    }
}

fn row_to_result(row: &SqliteRow) -> SearchResult {
    SearchResult {
        file: row_to_file_ref(row),
        snippet: row.get("snippet"),
    }
}
