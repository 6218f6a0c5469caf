//! Refresh: one reconciliation pass between the notes directory and the index.
//!
//! A pass scans the root, prunes index rows whose files are gone, and
//! upserts every file whose `(filename, fingerprint, modified_at)` triple
//! is not already indexed. Each pass recomputes from disk, so running it
//! again is always safe.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::content::{ContentStore, FsContentStore};
use crate::error::Result;
use crate::index::{DocumentIndex, UpsertOutcome};
use crate::models::FileRef;
use crate::scanner::Scanner;

/// Counts from one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub scanned: usize,
    pub pruned: u64,
    pub upserted: usize,
    pub unchanged: usize,
}

impl RefreshReport {
    /// True when the pass wrote anything, i.e. a search would now differ.
    pub fn changed(&self) -> bool {
        self.pruned > 0 || self.upserted > 0
    }
}

/// The only writer to the [`DocumentIndex`].
pub struct Synchronizer {
    index: DocumentIndex,
    store: Arc<dyn ContentStore>,
    scanner: Scanner,
    in_flight: Mutex<()>,
}

impl Synchronizer {
    pub fn new(index: DocumentIndex, store: Arc<dyn ContentStore>, scanner: Scanner) -> Self {
        Self {
            index,
            store,
            scanner,
            in_flight: Mutex::new(()),
        }
    }

    /// Opens the configured index over a filesystem store at the notes root.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let index = DocumentIndex::open(&config.db.path, config.search_options()).await?;
        let store = Arc::new(FsContentStore::new(&config.notes.root));
        Ok(Self::new(index, store, Scanner::from_config(config)?))
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Runs one pass. Concurrent calls queue behind the one in flight.
    ///
    /// Any error aborts the pass; rows written before the failure stay valid.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let _guard = self.in_flight.lock().await;

        let files = self.scanner.scan()?;
        let db_refs = self.index.get_all_file_refs().await?;

        let on_disk: HashSet<&str> = files.iter().map(String::as_str).collect();
        let to_prune: Vec<FileRef> = db_refs
            .into_iter()
            .filter(|r| !on_disk.contains(r.filename.as_str()))
            .collect();

        let mut report = RefreshReport {
            scanned: files.len(),
            ..RefreshReport::default()
        };

        if !to_prune.is_empty() {
            for file in &to_prune {
                tracing::debug!(filename = %file.filename, "pruning removed file");
            }
            report.pruned = self.index.prune_file_refs(&to_prune).await?;
        }

        for filename in &files {
            let file = FileRef::new(
                filename.as_str(),
                self.store.fingerprint(filename).await?,
                self.store.modified_at(filename).await?,
            );

            if self.index.is_unmodified(&file).await {
                report.unchanged += 1;
                continue;
            }

            let bytes = self.store.read(filename).await?;
            match self.index.upsert(&file, &bytes).await? {
                UpsertOutcome::Unchanged => report.unchanged += 1,
                UpsertOutcome::Inserted(_) | UpsertOutcome::Updated(_) => report.upserted += 1,
            }
        }

        if report.changed() {
            tracing::info!(
                scanned = report.scanned,
                upserted = report.upserted,
                pruned = report.pruned,
                "refresh applied changes"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "refresh found nothing to do");
        }

        Ok(report)
    }
}

/// Run the sync command: one refresh pass over the configured root.
pub async fn run_sync(config: &Config) -> anyhow::Result<()> {
    let sync = Synchronizer::from_config(config).await?;
    let report = sync.refresh().await?;

    println!(
        "sync: scanned {}, indexed {}, unchanged {}, pruned {}",
        report.scanned, report.upserted, report.unchanged, report.pruned
    );

    sync.index().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{fingerprint_bytes, FsContentStore};
    use crate::index::SearchOptions;
    use crate::scanner::FileTypes;
    use std::fs;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Synchronizer) {
        let tmp = TempDir::new().unwrap();
        let notes = tmp.path().join("notes");
        fs::create_dir_all(&notes).unwrap();
        let index = DocumentIndex::open(&tmp.path().join("nv.db"), SearchOptions::default())
            .await
            .unwrap();
        let sync = Synchronizer::new(
            index,
            Arc::new(FsContentStore::new(&notes)),
            Scanner::new(&notes, FileTypes::default()).unwrap(),
        );
        (tmp, sync)
    }

    #[tokio::test]
    async fn test_refresh_indexes_new_files() {
        let (tmp, sync) = setup().await;
        fs::write(tmp.path().join("notes/a.md"), "alpha").unwrap();
        fs::write(tmp.path().join("notes/b.txt"), "beta").unwrap();

        let report = sync.refresh().await.unwrap();

        assert_eq!(report.upserted, 2);
        assert!(report.changed());
        let stored = sync.index().get_file_ref("a.md").await.unwrap().unwrap();
        assert_eq!(stored.fingerprint, fingerprint_bytes(b"alpha"));
    }

    #[tokio::test]
    async fn test_second_refresh_is_unchanged() {
        let (tmp, sync) = setup().await;
        fs::write(tmp.path().join("notes/a.md"), "alpha").unwrap();
        sync.refresh().await.unwrap();

        let report = sync.refresh().await.unwrap();

        assert!(!report.changed());
        assert_eq!(report.unchanged, 1);
    }

    #[tokio::test]
    async fn test_refresh_prunes_deleted_files() {
        let (tmp, sync) = setup().await;
        fs::write(tmp.path().join("notes/gone.md"), "ephemeral narwhal").unwrap();
        sync.refresh().await.unwrap();

        fs::remove_file(tmp.path().join("notes/gone.md")).unwrap();
        let report = sync.refresh().await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(sync.index().count().await.unwrap(), 0);
        assert!(sync.index().search("narwhal").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_updates_changed_file_in_place() {
        let (tmp, sync) = setup().await;
        let path = tmp.path().join("notes/a.md");
        fs::write(&path, "first").unwrap();
        sync.refresh().await.unwrap();
        let before = sync.index().get_file_ref("a.md").await.unwrap().unwrap();

        fs::write(&path, "second version").unwrap();
        let report = sync.refresh().await.unwrap();

        let after = sync.index().get_file_ref("a.md").await.unwrap().unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(before.document_id, after.document_id);
        assert_eq!(after.fingerprint, fingerprint_bytes(b"second version"));
    }

    #[tokio::test]
    async fn test_refresh_missing_root_errors() {
        let (tmp, sync) = setup().await;
        fs::remove_dir_all(tmp.path().join("notes")).unwrap();
        assert!(sync.refresh().await.is_err());
    }
}
