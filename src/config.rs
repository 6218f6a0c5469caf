use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::index::SearchOptions;
use crate::scanner::FileTypes;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("nv.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotesConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Source-code text types indexed in addition to txt/md/mdown.
    #[serde(default)]
    pub extra_extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            extra_extensions: Vec::new(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_recent_limit")]
    pub recent_limit: i64,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            snippet_tokens: default_snippet_tokens(),
        }
    }
}

fn default_recent_limit() -> i64 {
    20
}
fn default_snippet_tokens() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebounceConfig {
    #[serde(default = "default_watch_ms")]
    pub watch_ms: u64,
    #[serde(default = "default_save_ms")]
    pub save_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            watch_ms: default_watch_ms(),
            save_ms: default_save_ms(),
        }
    }
}

fn default_watch_ms() -> u64 {
    crate::watcher::DEFAULT_WINDOW.as_millis() as u64
}
fn default_save_ms() -> u64 {
    crate::editor::DEFAULT_SAVE_WINDOW.as_millis() as u64
}

impl Config {
    pub fn file_types(&self) -> FileTypes {
        FileTypes::with_extra(&self.notes.extra_extensions)
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            recent_limit: self.search.recent_limit,
            snippet_tokens: self.search.snippet_tokens,
        }
    }

    pub fn watch_window(&self) -> Duration {
        Duration::from_millis(self.debounce.watch_ms)
    }

    pub fn save_window(&self) -> Duration {
        Duration::from_millis(self.debounce.save_ms)
    }

    /// Checks value ranges and normalizes extension entries.
    pub fn validate(mut self) -> Result<Self> {
        if self.search.recent_limit < 1 {
            anyhow::bail!("search.recent_limit must be >= 1");
        }
        if !(1..=64).contains(&self.search.snippet_tokens) {
            anyhow::bail!("search.snippet_tokens must be in [1, 64]");
        }
        if self.debounce.watch_ms == 0 || self.debounce.save_ms == 0 {
            anyhow::bail!("debounce windows must be > 0");
        }

        let mut extensions = Vec::with_capacity(self.notes.extra_extensions.len());
        for ext in &self.notes.extra_extensions {
            let ext = ext.trim().trim_start_matches('.');
            if ext.is_empty() {
                anyhow::bail!("notes.extra_extensions entries must not be empty");
            }
            extensions.push(ext.to_ascii_lowercase());
        }
        self.notes.extra_extensions = extensions;

        Ok(self)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.validate()
}
