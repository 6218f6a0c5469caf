//! Document editor session: the buffer of the focused document and its
//! debounced write-back.
//!
//! ```text
//!            focus(file)                 edit(text)
//!  Viewing ──────────────▶ Editing ◀──────────────┐
//!     ▲                      │  └─ schedule write ─┘
//!     └──────── blur() ──────┘
//!        reload if disk differs and a refresh is pending
//! ```
//!
//! Refresh notifications never touch the buffer while the document has
//! focus. They only set a flag that [`EditorSession::blur`] consumes, so a
//! reload cannot land in the middle of typing.

use async_trait::async_trait;
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::content::{ContentStore, FsContentStore};
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::models::FileRef;
use crate::refresh::Synchronizer;
use crate::scanner::FileTypes;
use crate::ui::RefreshTarget;

/// Default quiet period before an edit is written back.
pub const DEFAULT_SAVE_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Viewing,
    Editing,
}

pub struct EditorSession {
    store: Arc<dyn ContentStore>,
    save: Debouncer,
    state: SessionState,
    current_file: Option<FileRef>,
    buffer: String,
    pending_disk_refresh: bool,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("state", &self.state)
            .field("current_file", &self.current_file.as_ref().map(|f| &f.filename))
            .field("buffer_len", &self.buffer.len())
            .field("pending_disk_refresh", &self.pending_disk_refresh)
            .finish()
    }
}

impl EditorSession {
    pub fn new(store: Arc<dyn ContentStore>, save_window: Duration) -> Self {
        Self {
            store,
            save: Debouncer::new(save_window),
            state: SessionState::Viewing,
            current_file: None,
            buffer: String::new(),
            pending_disk_refresh: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn current_file(&self) -> Option<&FileRef> {
        self.current_file.as_ref()
    }

    pub fn has_pending_disk_refresh(&self) -> bool {
        self.pending_disk_refresh
    }

    /// Enters Editing for `file` and loads its current bytes.
    ///
    /// A write still pending for a different file is flushed first. On a
    /// read failure the session is left as it was.
    pub async fn focus(&mut self, file: FileRef) -> Result<()> {
        let switching = self
            .current_file
            .as_ref()
            .is_some_and(|current| current.filename != file.filename);
        if switching {
            self.flush().await?;
        }

        let bytes = self.store.read(&file.filename).await?;
        self.buffer = String::from_utf8_lossy(&bytes).into_owned();
        tracing::debug!(file = %file.filename, bytes = bytes.len(), "editing document");

        self.current_file = Some(file);
        self.state = SessionState::Editing;
        self.pending_disk_refresh = false;
        Ok(())
    }

    /// Replaces the buffer and schedules a write-back.
    ///
    /// Returns `false` when nothing was scheduled: no document has focus, or
    /// the text is unchanged.
    pub fn edit(&mut self, text: impl Into<String>) -> bool {
        if self.state != SessionState::Editing {
            return false;
        }
        if self.current_file.is_none() {
            return false;
        }

        let text = text.into();
        if text == self.buffer {
            return false;
        }
        self.buffer = text;
        self.schedule_write();
        true
    }

    /// Cancels the pending write-back, if any, and writes the buffer now.
    ///
    /// Returns whether a write happened. Unlike the debounced path, a
    /// failure here is returned to the caller, and the write is scheduled
    /// again for after the quiet period.
    pub async fn flush(&mut self) -> Result<bool> {
        if !self.save.cancel_pending() {
            return Ok(false);
        }
        let Some(filename) = self.current_file.as_ref().map(|f| f.filename.clone()) else {
            return Ok(false);
        };

        if let Err(e) = self.store.write(&filename, self.buffer.as_bytes()).await {
            tracing::warn!(file = %filename, error = %e, "flush failed, will retry");
            self.schedule_write();
            return Err(e);
        }
        Ok(true)
    }

    /// Records that the file may have changed on disk. The buffer is left
    /// alone until [`blur`](Self::blur).
    pub fn mark_dirty_from_disk(&mut self) {
        if self.current_file.is_some() {
            self.pending_disk_refresh = true;
        }
    }

    /// Leaves Editing. Returns whether the buffer was reloaded from disk.
    ///
    /// An unsaved edit still waiting out its quiet period is written first
    /// and wins over whatever is on disk. If that write fails the session
    /// stays in Editing with the refresh flag intact, and the write is
    /// retried after the quiet period.
    pub async fn blur(&mut self) -> Result<bool> {
        if self.state != SessionState::Editing {
            return Ok(false);
        }

        if self.save.is_pending() {
            if self.pending_disk_refresh {
                tracing::warn!(
                    file = ?self.current_file.as_ref().map(|f| &f.filename),
                    "unsaved edit overwrites a possible external change"
                );
            }
            self.flush().await?;
            self.state = SessionState::Viewing;
            self.pending_disk_refresh = false;
            return Ok(false);
        }

        self.state = SessionState::Viewing;
        self.reload_if_changed().await
    }

    /// Drops the current document. A pending write-back is flushed first.
    pub async fn clear(&mut self) -> Result<()> {
        self.flush().await?;
        self.current_file = None;
        self.buffer.clear();
        self.state = SessionState::Viewing;
        self.pending_disk_refresh = false;
        Ok(())
    }

    /// Creates `name` as an empty note and focuses it. An existing note of
    /// that name is opened as is.
    ///
    /// A name without a supported extension gets `.md` appended.
    pub async fn create(&mut self, name: &str) -> Result<FileRef> {
        let filename = note_filename(name)?;

        match self.store.read(&filename).await {
            Ok(_) => tracing::debug!(file = %filename, "note exists, opening it"),
            Err(e) if e.is_not_found() => {
                self.store.write(&filename, b"").await?;
                tracing::info!(file = %filename, "created note");
            }
            Err(e) => return Err(e),
        }

        let file = FileRef::new(
            filename.as_str(),
            self.store.fingerprint(&filename).await?,
            self.store.modified_at(&filename).await?,
        );
        self.focus(file.clone()).await?;
        Ok(file)
    }

    fn schedule_write(&mut self) {
        let Some(file) = &self.current_file else {
            return;
        };

        let store = self.store.clone();
        let filename = file.filename.clone();
        let snapshot = self.buffer.clone();
        self.save.schedule(move || async move {
            match store.write(&filename, snapshot.as_bytes()).await {
                Ok(()) => tracing::debug!(file = %filename, bytes = snapshot.len(), "saved"),
                // the buffer stays as typed; the next edit retries
                Err(e) => tracing::warn!(file = %filename, error = %e, "write-back failed"),
            }
        });
    }

    async fn reload_if_changed(&mut self) -> Result<bool> {
        if !std::mem::take(&mut self.pending_disk_refresh) {
            return Ok(false);
        }
        let Some(file) = &self.current_file else {
            return Ok(false);
        };

        let bytes = self.store.read(&file.filename).await?;
        let on_disk = String::from_utf8_lossy(&bytes);
        if on_disk == self.buffer {
            return Ok(false);
        }

        tracing::info!(file = %file.filename, "reloading document changed on disk");
        self.buffer = on_disk.into_owned();
        Ok(true)
    }
}

/// Root-relative filename for a new note called `name`.
fn note_filename(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("note name is blank".into()));
    }

    let path = Path::new(name);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::Validation(format!(
            "note name '{}' must stay inside the notes root",
            name
        )));
    }

    if FileTypes::default().is_supported(path) {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.md", name))
    }
}

#[async_trait(?Send)]
impl RefreshTarget for EditorSession {
    async fn index_refreshed(&mut self) {
        self.mark_dirty_from_disk();

        // Nothing is being typed while viewing, so the refresh applies now.
        if self.state == SessionState::Viewing {
            if let Err(e) = self.reload_if_changed().await {
                tracing::warn!(error = %e, "reloading viewed document failed");
            }
        }
    }
}

/// Run the new command: create a note, optionally fill it, and index it.
pub async fn run_new(config: &Config, name: &str, text: Option<&str>) -> anyhow::Result<()> {
    let sync = Synchronizer::from_config(config).await?;
    let store = Arc::new(FsContentStore::new(&config.notes.root));
    let mut session = EditorSession::new(store, config.save_window());

    let file = session.create(name).await?;
    if let Some(text) = text {
        session.edit(text);
    }
    session.clear().await?;

    sync.refresh().await?;
    println!("Created \"{}\" at {}", file.display_name(), file.filename);

    sync.index().close().await;
    Ok(())
}
