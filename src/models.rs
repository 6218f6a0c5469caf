//! Core data models used throughout notational.
//!
//! These types describe an indexed document and a query hit as they flow
//! between the index, the synchronizer, and the search observers.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Identity of one indexed version of a file.
///
/// The `(filename, fingerprint, modified_at)` triple identifies an exact
/// version; the index skips re-indexing when it already holds that triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRef {
    /// Assigned by the index on first insert, stable for the life of the row.
    pub document_id: Option<i64>,
    /// Root-relative path with `/` separators.
    pub filename: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub fingerprint: String,
    pub modified_at: DateTime<Utc>,
}

impl FileRef {
    pub fn new(
        filename: impl Into<String>,
        fingerprint: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_id: None,
            filename: filename.into(),
            fingerprint: fingerprint.into(),
            modified_at,
        }
    }

    /// File stem, which is what list views show and match the query prefix against.
    pub fn display_name(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }

    /// Rejects references that cannot identify a version.
    pub fn validate(&self) -> Result<()> {
        if self.filename.is_empty() {
            return Err(Error::Validation("filename is blank".into()));
        }
        if self.fingerprint.is_empty() {
            return Err(Error::Validation("fingerprint is blank".into()));
        }
        if self.modified_at == DateTime::UNIX_EPOCH {
            return Err(Error::Validation("modified_at is not defined".into()));
        }
        Ok(())
    }
}

/// A query hit. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub file: FileRef,
    /// Engine-generated excerpt; matched tokens are wrapped in `**`.
    pub snippet: String,
}

impl SearchResult {
    pub fn filename(&self) -> &str {
        &self.file.filename
    }

    /// Short timestamp: time of day inside the last 24 hours, a date otherwise.
    pub fn format_modified(&self, now: DateTime<Utc>) -> String {
        let modified = self.file.modified_at.with_timezone(&Local);
        if now.signed_duration_since(self.file.modified_at) < chrono::Duration::hours(24) {
            modified.format("%-I:%M%p").to_string()
        } else {
            modified.format("%b %d, %Y").to_string()
        }
    }
}

/// Nanoseconds since the Unix epoch, the storage form of timestamps.
pub(crate) fn to_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
