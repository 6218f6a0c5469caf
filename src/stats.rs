//! Index statistics for `nv stats`.
//!
//! A quick check that a sync picked up what it should have: how many
//! notes are indexed, how large the database is, and the span of
//! modification times it covers.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::index::DocumentIndex;
use crate::models::from_nanos;

/// Summary of what the index currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: i64,
    pub db_bytes: u64,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
    pub last_indexed: Option<DateTime<Utc>>,
}

/// Collects [`IndexStats`] for an open index whose file lives at `db_path`.
pub async fn collect(index: &DocumentIndex, db_path: &std::path::Path) -> Result<IndexStats> {
    let documents = index.count().await?;

    let (newest, oldest, last_indexed): (Option<i64>, Option<i64>, Option<i64>) = sqlx::query_as(
        "SELECT MAX(modified_at), MIN(modified_at), MAX(last_indexed_at) FROM documents",
    )
    .fetch_one(index.pool())
    .await?;

    let db_bytes = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    Ok(IndexStats {
        documents,
        db_bytes,
        newest: newest.map(from_nanos),
        oldest: oldest.map(from_nanos),
        last_indexed: last_indexed.map(from_nanos),
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = DocumentIndex::open(&config.db.path, config.search_options()).await?;
    let stats = collect(&index, &config.db.path).await?;

    println!("Notational — Index Stats");
    println!("========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(stats.db_bytes));
    println!("  Notes root:    {}", config.notes.root.display());
    println!();
    println!("  Documents:     {}", stats.documents);
    println!("  Newest note:   {}", format_ts(stats.newest));
    println!("  Oldest note:   {}", format_ts(stats.oldest));
    println!("  Last indexed:  {}", format_ts(stats.last_indexed));
    println!();

    index.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        None => "never".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchOptions;
    use crate::models::FileRef;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[tokio::test]
    async fn test_collect_on_empty_index() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nv.db");
        let index = DocumentIndex::open(&db_path, SearchOptions::default())
            .await
            .unwrap();

        let stats = collect(&index, &db_path).await.unwrap();

        assert_eq!(stats.documents, 0);
        assert!(stats.db_bytes > 0);
        assert_eq!(stats.newest, None);
        assert_eq!(stats.oldest, None);
        assert_eq!(format_ts(stats.last_indexed), "never");
    }

    #[tokio::test]
    async fn test_collect_reports_modification_span() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nv.db");
        let index = DocumentIndex::open(&db_path, SearchOptions::default())
            .await
            .unwrap();

        let early = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        index
            .upsert(&FileRef::new("early.md", "a", early), b"first")
            .await
            .unwrap();
        index
            .upsert(&FileRef::new("late.md", "b", late), b"second")
            .await
            .unwrap();

        let stats = collect(&index, &db_path).await.unwrap();

        assert_eq!(stats.documents, 2);
        assert_eq!(stats.newest, Some(late));
        assert_eq!(stats.oldest, Some(early));
        assert!(stats.last_indexed.is_some());
    }
}
