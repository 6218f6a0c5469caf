//! # Notational CLI (`nv`)
//!
//! The `nv` binary indexes a directory of notes and searches it. It is a
//! thin host around the library: every command maps to one `run_*`
//! function.
//!
//! ## Usage
//!
//! ```bash
//! nv [--config ./nv.toml] [--db nv.db] [--root ~/notes] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nv init` | Create the SQLite database and run schema migrations |
//! | `nv sync` | Reconcile the index with the notes root once |
//! | `nv search "<query>"` | Search indexed notes; an empty query lists recent notes |
//! | `nv stats` | Show what the index holds |
//! | `nv watch [query]` | Keep the index live and re-print results on change |
//! | `nv new <name> [--text ..]` | Create a note (`.md` unless named otherwise) and index it |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notational::config::{self, Config};
use notational::{editor, index, refresh, search, stats, watcher};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "nv.toml";

/// Notational: full-text search over a directory of notes.
#[derive(Parser)]
#[command(
    name = "nv",
    about = "Notational: full-text search over a directory of plain-text and markdown notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./nv.toml` when that file exists; otherwise built-in
    /// defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `[db].path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Notes directory, overriding `[notes].root`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and its tables. Running it again
    /// is safe.
    Init,

    /// Index the notes root once.
    ///
    /// New and changed files are indexed, files gone from disk are pruned,
    /// and unchanged files are skipped.
    Sync,

    /// Search indexed notes.
    ///
    /// Every word is matched as a prefix against filenames and bodies. An
    /// empty query lists the most recently modified notes.
    Search {
        /// The search query string.
        query: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats,

    /// Create a new note and index it.
    ///
    /// A name without a supported extension gets `.md`. An existing note of
    /// the same name is left as it is unless `--text` is given.
    New {
        /// Note name, relative to the notes root.
        name: String,

        /// Body to write into the note.
        #[arg(long)]
        text: Option<String>,
    },

    /// Watch the notes root and re-run a search whenever it changes.
    Watch {
        /// Query to keep re-running; empty lists recent notes.
        #[arg(default_value = "")]
        query: String,
    },
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG))?,
        None => Config::default(),
    };

    if let Some(db) = &cli.db {
        cfg.db.path = db.clone();
    }
    if let Some(root) = &cli.root {
        cfg.notes.root = root.clone();
    }

    cfg.validate().context("Invalid configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries command output, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli)?;

    match cli.command {
        Commands::Init => {
            let index = index::DocumentIndex::open(&cfg.db.path, cfg.search_options()).await?;
            index.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            refresh::run_sync(&cfg).await?;
        }
        Commands::Search { query, json } => {
            search::run_search(&cfg, &query, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::New { name, text } => {
            editor::run_new(&cfg, &name, text.as_deref()).await?;
        }
        Commands::Watch { query } => {
            watcher::run_watch(&cfg, &query).await?;
        }
    }

    Ok(())
}
