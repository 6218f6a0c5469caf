use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};

/// Extensions indexed regardless of configuration.
pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "md", "mdown"];

// Each directory is listed twice: the bare form prunes the walk at the
// directory, the `/**` form rejects anything beneath it.
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git",
    "**/.git/**",
    "**/target",
    "**/target/**",
    "**/node_modules",
    "**/node_modules/**",
];

/// File-type allow-list shared by the scanner and the watcher.
#[derive(Debug, Clone)]
pub struct FileTypes {
    extensions: BTreeSet<String>,
}

impl Default for FileTypes {
    fn default() -> Self {
        Self::with_extra::<&str>(&[])
    }
}

impl FileTypes {
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        let extensions = DEFAULT_EXTENSIONS
            .iter()
            .map(|e| e.to_string())
            .chain(extra.iter().map(|e| e.as_ref().to_ascii_lowercase()))
            .collect();
        Self { extensions }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Walks the notes root and lists every allow-listed regular file.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    file_types: FileTypes,
    excludes: GlobSet,
    follow_symlinks: bool,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, file_types: FileTypes) -> Result<Self> {
        Self::with_excludes(root, file_types, &[], false)
    }

    pub fn with_excludes(
        root: impl Into<PathBuf>,
        file_types: FileTypes,
        exclude_globs: &[String],
        follow_symlinks: bool,
    ) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect();
        patterns.extend(exclude_globs.iter().cloned());

        Ok(Self {
            root: root.into(),
            file_types,
            excludes: build_globset(&patterns)?,
            follow_symlinks,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_excludes(
            &config.notes.root,
            config.file_types(),
            &config.notes.exclude_globs,
            config.notes.follow_symlinks,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_types(&self) -> &FileTypes {
        &self.file_types
    }

    /// Root-relative filenames with `/` separators, sorted.
    ///
    /// Excluded directories are not descended into. Entries whose relative
    /// path is not valid UTF-8 cannot be stored as a filename and are
    /// skipped with a warning. Any other traversal error aborts the scan.
    pub fn scan(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(Error::io(
                &self.root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "notes root is not a directory"),
            ));
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || self.admits(entry.path()));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.file_types.is_supported(path) {
                continue;
            }

            if let Some(rel_str) = relative_name(&self.root, path) {
                files.push(rel_str);
            }
        }

        // Sort for deterministic ordering
        files.sort();

        Ok(files)
    }

    /// Whether `path` (absolute or root-relative) falls under an exclude
    /// pattern. A path with no UTF-8 relative name counts as excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        match relative_name(&self.root, path) {
            Some(rel) => self.excludes.is_match(rel),
            None => true,
        }
    }

    fn admits(&self, path: &Path) -> bool {
        match relative_name(&self.root, path) {
            Some(rel) => !self.excludes.is_match(rel),
            None => {
                tracing::warn!(path = %path.display(), "skipping path that is not valid UTF-8");
                false
            }
        }
    }
}

/// Root-relative, `/`-separated form of `path`, or `None` when a component
/// is not valid UTF-8.
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid exclude globs: {}", e)))
}
