//! Error taxonomy for the index and its synchronization engine.
//!
//! Each variant maps to one failure class the callers treat differently:
//! validation failures are rejected before any write, storage and I/O
//! failures abort the current operation, and watch failures are mostly
//! logged by the watcher loop rather than returned.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A [`FileRef`](crate::models::FileRef) was missing a required field,
    /// or a new note name was unusable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The embedded database failed during a query or write.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Reading, writing, or stat-ing a file failed.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed part way through a scan.
    #[error("scan failed: {0}")]
    Scan(#[from] walkdir::Error),

    /// The filesystem notification backend refused a subscription.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// True when a file operation failed because the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// True for errors raised before touching any backing store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
