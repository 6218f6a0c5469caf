use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{timeout, Instant};

use notational::content::FsContentStore;
use notational::index::{DocumentIndex, SearchOptions};
use notational::refresh::Synchronizer;
use notational::scanner::{FileTypes, Scanner};
use notational::search::SearchContext;
use notational::ui::{self, UiExecutor};
use notational::watcher::Watcher;

const WINDOW: Duration = Duration::from_millis(100);
const PATIENCE: Duration = Duration::from_secs(10);

struct Harness {
    _tmp: TempDir,
    notes: PathBuf,
    sync: Arc<Synchronizer>,
    context: SearchContext,
    executor: UiExecutor<SearchContext>,
    watcher: Watcher,
}

async fn start(files: &[(&str, &str)]) -> Harness {
    let tmp = TempDir::new().unwrap();
    let notes = tmp.path().join("notes");
    fs::create_dir_all(&notes).unwrap();
    for (name, body) in files {
        fs::write(notes.join(name), body).unwrap();
    }

    let index = DocumentIndex::open(&tmp.path().join("nv.db"), SearchOptions::default())
        .await
        .unwrap();
    let sync = Arc::new(Synchronizer::new(
        index,
        Arc::new(FsContentStore::new(&notes)),
        Scanner::new(&notes, FileTypes::default()).unwrap(),
    ));
    sync.refresh().await.unwrap();

    let mut context = SearchContext::new(sync.index().clone());
    context.search("").await.unwrap();

    let (sender, executor) = ui::channel::<SearchContext>();
    let mut watcher = Watcher::new();
    watcher.start(sync.clone(), sender, WINDOW).unwrap();

    Harness {
        _tmp: tmp,
        notes,
        sync,
        context,
        executor,
        watcher,
    }
}

impl Harness {
    /// Drives posted UI tasks until `done` holds or patience runs out.
    async fn wait_for(&mut self, done: impl Fn(&SearchContext) -> bool) -> bool {
        let deadline = Instant::now() + PATIENCE;
        while !done(&self.context) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.executor.run_next(&mut self.context)).await {
                Ok(true) => {}
                _ => return done(&self.context),
            }
        }
        true
    }

    fn names(context: &SearchContext) -> Vec<String> {
        context
            .last_results()
            .iter()
            .map(|r| r.filename().to_string())
            .collect()
    }
}

#[tokio::test]
async fn test_created_file_appears_in_results() {
    let mut h = start(&[]).await;
    assert!(h.watcher.is_running());
    assert!(h.context.last_results().is_empty());

    fs::write(h.notes.join("fresh.md"), "brand new note").unwrap();

    assert!(
        h.wait_for(|ctx| Harness::names(ctx) == ["fresh.md"]).await,
        "results never showed fresh.md"
    );
    assert_eq!(h.context.last_query(), "");
}

#[tokio::test]
async fn test_deleted_file_is_pruned() {
    let mut h = start(&[("doomed.md", "short lived"), ("kept.md", "stays")]).await;
    assert_eq!(h.context.last_results().len(), 2);

    fs::remove_file(h.notes.join("doomed.md")).unwrap();

    assert!(h.wait_for(|ctx| Harness::names(ctx) == ["kept.md"]).await);
    assert!(h.sync.index().get_file_ref("doomed.md").await.unwrap().is_none());
}

#[tokio::test]
async fn test_last_query_is_rerun_after_change() {
    let mut h = start(&[("a.md", "walrus")]).await;
    h.context.search("walrus").await.unwrap();

    fs::write(h.notes.join("b.md"), "another walrus").unwrap();

    assert!(h.wait_for(|ctx| ctx.last_results().len() == 2).await);
    assert_eq!(h.context.last_query(), "walrus");
}

#[tokio::test]
async fn test_burst_of_writes_triggers_one_refresh() {
    let mut h = start(&[]).await;

    for i in 0..5 {
        fs::write(h.notes.join(format!("burst-{}.md", i)), "same burst").unwrap();
    }

    let first = timeout(PATIENCE, h.executor.run_next(&mut h.context)).await;
    assert_eq!(first.ok(), Some(true));
    assert_eq!(h.context.last_results().len(), 5);

    let second = timeout(WINDOW * 10, h.executor.run_next(&mut h.context)).await;
    assert!(second.is_err(), "burst produced a second refresh");
}

#[tokio::test]
async fn test_unsupported_file_does_not_trigger_refresh() {
    let mut h = start(&[("a.md", "alpha")]).await;

    fs::write(h.notes.join("picture.png"), [0u8, 1, 2, 3]).unwrap();

    let posted = timeout(WINDOW * 10, h.executor.run_next(&mut h.context)).await;
    assert!(posted.is_err(), "a refresh was posted for a png");
    assert_eq!(h.sync.index().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_file_in_new_subdirectory_is_indexed() {
    let mut h = start(&[]).await;

    fs::create_dir(h.notes.join("projects")).unwrap();
    // let the watcher subscribe to the new directory first
    tokio::time::sleep(WINDOW * 5).await;
    h.executor.run_pending(&mut h.context).await;

    fs::write(h.notes.join("projects/plan.md"), "roadmap").unwrap();

    assert!(
        h.wait_for(|ctx| Harness::names(ctx) == ["projects/plan.md"])
            .await
    );
}

#[tokio::test]
async fn test_stop_is_idempotent_and_closes_the_queue() {
    let mut h = start(&[]).await;

    h.watcher.stop();
    h.watcher.stop();
    assert!(!h.watcher.is_running());

    let next = timeout(PATIENCE, h.executor.run_next(&mut h.context)).await;
    assert_eq!(next.ok(), Some(false));
}

#[tokio::test]
async fn test_stop_before_start_is_safe() {
    let mut watcher = Watcher::new();
    watcher.stop();
    assert!(!watcher.is_running());
}

#[tokio::test]
async fn test_start_on_missing_root_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing");
    let index = DocumentIndex::open(&tmp.path().join("nv.db"), SearchOptions::default())
        .await
        .unwrap();
    let sync = Arc::new(Synchronizer::new(
        index,
        Arc::new(FsContentStore::new(&missing)),
        Scanner::new(&missing, FileTypes::default()).unwrap(),
    ));

    let (sender, _executor) = ui::channel::<SearchContext>();
    let mut watcher = Watcher::new();

    assert!(watcher.start(sync, sender, WINDOW).is_err());
    assert!(!watcher.is_running());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_name_that_is_not_utf8_does_not_trigger_refresh() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let mut h = start(&[("a.md", "alpha")]).await;

    fs::write(h.notes.join(OsStr::from_bytes(b"caf\xe9.md")), "accented").unwrap();

    let posted = timeout(WINDOW * 10, h.executor.run_next(&mut h.context)).await;
    assert!(posted.is_err(), "a refresh was posted for an unstorable name");

    fs::write(h.notes.join("b.md"), "beta").unwrap();
    assert!(h.wait_for(|ctx| ctx.last_results().len() == 2).await);
}
