//! Filesystem watcher driving debounced refreshes.
//!
//! ```text
//! notify callback ─▶ channel ─▶ watch loop ─▶ filter ─▶ Debouncer ─▶ refresh
//!                                                                    │ changed
//!                                                                    ▼
//!                                                      UiSender::post_index_refreshed
//! ```
//!
//! Every directory under the root gets its own non-recursive subscription
//! so newly created directories can be added as they appear and a failure
//! on one subdirectory only costs that subdirectory. Events on files
//! outside the allow-list are dropped before they reach the debouncer so
//! unrelated writes (the database's own WAL, for one) never extend the
//! quiet period.

use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use crate::config::Config;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::refresh::Synchronizer;
use crate::search::{print_results, SearchContext};
use crate::ui::{self, RefreshTarget, UiSender};

/// Default quiet period between the last event and the refresh.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// Handle to a running (or stopped) watch session.
#[derive(Debug, Default)]
pub struct Watcher {
    running: Option<Running>,
}

#[derive(Debug)]
struct Running {
    root: PathBuf,
    task: JoinHandle<()>,
}

impl Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Subscribes to the synchronizer's root and starts the watch loop.
    ///
    /// Fails only if the root itself cannot be watched. A watcher that is
    /// already running is stopped first. Must be called inside a tokio runtime.
    pub fn start<S: RefreshTarget + 'static>(
        &mut self,
        sync: Arc<Synchronizer>,
        ui: UiSender<S>,
        window: Duration,
    ) -> Result<()> {
        self.stop();

        let root = sync.scanner().root().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // The loop going away is the only way this fails.
            let _ = tx.send(event);
        })?;
        watcher.watch(&root, RecursiveMode::NonRecursive)?;

        let mut dirs = HashSet::from([root.clone()]);
        watch_subdirectories(&mut watcher, &mut dirs, &sync, &root);

        let task = tokio::spawn(watch_loop(
            WatchState {
                watcher,
                dirs,
                sync,
            },
            rx,
            ui,
            window,
        ));

        tracing::info!(root = %root.display(), "watcher started");
        self.running = Some(Running { root, task });
        Ok(())
    }

    /// Closes the subscription and ends the loop. Safe to call repeatedly
    /// or before [`start`](Self::start). A refresh already running completes.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
            tracing::info!(root = %running.root.display(), "watcher stopped");
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchState {
    watcher: RecommendedWatcher,
    dirs: HashSet<PathBuf>,
    sync: Arc<Synchronizer>,
}

impl WatchState {
    /// Updates subscriptions for `event` and reports whether it should
    /// trigger a refresh.
    fn absorb(&mut self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }

        let mut relevant = false;
        for path in &event.paths {
            if self.sync.scanner().is_excluded(path) {
                continue;
            }

            match event.kind {
                EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) if path.is_dir() => {
                    if !self.dirs.contains(path) {
                        watch_dir(&mut self.watcher, &mut self.dirs, path);
                        watch_subdirectories(&mut self.watcher, &mut self.dirs, &self.sync, path);
                        // a directory moved in may already hold notes
                        relevant = true;
                    }
                }
                EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
                    if self.dirs.remove(path) =>
                {
                    relevant = true;
                }
                _ => {}
            }

            if self.sync.scanner().file_types().is_supported(path) {
                relevant = true;
            }
        }
        relevant
    }
}

async fn watch_loop<S: RefreshTarget + 'static>(
    mut state: WatchState,
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ui: UiSender<S>,
    window: Duration,
) {
    let debouncer = Debouncer::new(window);

    while let Some(result) = events.recv().await {
        match result {
            Ok(event) => {
                if !state.absorb(&event) {
                    continue;
                }
                tracing::debug!(kind = ?event.kind, paths = ?event.paths, "watcher event");

                let sync = state.sync.clone();
                let ui = ui.clone();
                debouncer.schedule(move || refresh_and_notify(sync, ui));
            }
            Err(e) => tracing::error!(error = %e, "watcher error"),
        }
    }
}

async fn refresh_and_notify<S: RefreshTarget + 'static>(sync: Arc<Synchronizer>, ui: UiSender<S>) {
    match sync.refresh().await {
        Ok(report) if report.changed() => {
            if !ui.post_index_refreshed() {
                tracing::debug!("ui executor gone; dropping refresh notification");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "watcher refresh failed"),
    }
}

fn watch_dir(watcher: &mut RecommendedWatcher, dirs: &mut HashSet<PathBuf>, dir: &Path) {
    match watcher.watch(dir, RecursiveMode::NonRecursive) {
        Ok(()) => {
            dirs.insert(dir.to_path_buf());
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "could not watch directory");
        }
    }
}

fn watch_subdirectories(
    watcher: &mut RecommendedWatcher,
    dirs: &mut HashSet<PathBuf>,
    sync: &Synchronizer,
    under: &Path,
) {
    let walker = WalkDir::new(under)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !sync.scanner().is_excluded(entry.path()));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                if !dirs.contains(entry.path()) {
                    watch_dir(watcher, dirs, entry.path());
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "could not walk directory for watching"),
        }
    }
}

/// Run the watch command: index once, then keep re-printing `query`'s
/// results whenever the notes change, until Ctrl-C.
pub async fn run_watch(config: &Config, query: &str) -> anyhow::Result<()> {
    let sync = Arc::new(Synchronizer::from_config(config).await?);
    let report = sync.refresh().await?;
    println!(
        "Indexed {} notes under {}",
        report.scanned,
        config.notes.root.display()
    );

    let mut context = SearchContext::new(sync.index().clone());
    context.register(|ctx: &SearchContext| {
        println!();
        println!("Results for {:?}:", ctx.last_query());
        print_results(ctx.last_results());
    });
    context.search(query).await?;

    let (ui_tx, mut executor) = ui::channel::<SearchContext>();
    let mut watcher = Watcher::new();
    watcher.start(sync.clone(), ui_tx, config.watch_window())?;
    println!("Watching for changes (Ctrl-C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            more = executor.run_next(&mut context) => {
                if !more {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    watcher.stop();
    sync.index().close().await;
    Ok(())
}
