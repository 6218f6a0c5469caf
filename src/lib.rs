//! # Notational
//!
//! A local full-text index over a directory of plain-text and markdown
//! notes, kept in step with the disk by a debounced filesystem watcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────────┐
//! │ Scanner  │──▶│ Synchronizer │──▶│ DocumentIndex   │
//! │ walkdir  │   │  (refresh)   │   │ SQLite + FTS5   │
//! └──────────┘   └──────▲───────┘   └────────┬────────┘
//!                       │ debounced          │ search
//!                ┌──────┴─────┐       ┌──────▼────────┐
//!                │  Watcher   │──────▶│ SearchContext │──▶ observers
//!                │  (notify)  │  ui   └───────────────┘
//!                └────────────┘
//!
//! EditorSession ──debounced write──▶ ContentStore ──▶ next refresh
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! nv init                 # create database
//! nv sync                 # index the notes root once
//! nv search "new york"    # prefix search over filenames and bodies
//! nv watch                # keep the index live and print results
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | `FileRef` and `SearchResult` |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`content`] | Content store trait and filesystem store |
//! | [`index`] | Document index: upsert, prune, search |
//! | [`scanner`] | Allow-listed directory walk |
//! | [`refresh`] | Synchronizer: disk to index reconciliation |
//! | [`debounce`] | Trailing-edge debouncer |
//! | [`ui`] | Hand-off queue onto UI-owned state |
//! | [`watcher`] | Filesystem watcher driving refreshes |
//! | [`search`] | Search context and observer fan-out |
//! | [`editor`] | Document editor session |
//! | [`stats`] | Index statistics |

pub mod config;
pub mod content;
pub mod db;
pub mod debounce;
pub mod editor;
pub mod error;
pub mod index;
pub mod migrate;
pub mod models;
pub mod refresh;
pub mod scanner;
pub mod search;
pub mod stats;
pub mod ui;
pub mod watcher;

pub use error::{Error, Result};
