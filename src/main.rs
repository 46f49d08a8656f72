//! # Simscan CLI
//!
//! The `simscan` binary is the reference caller for the detection engine.
//! It provides commands for database initialization, corpus ingestion,
//! embedding maintenance, index creation, detection, and similarity search.
//!
//! ## Usage
//!
//! ```bash
//! simscan --config ./config/simscan.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `simscan init` | Create the SQLite database and run schema migrations |
//! | `simscan load <file>` | Ingest reference sources from a JSON corpus |
//! | `simscan embed pending` | Backfill missing embeddings |
//! | `simscan embed rebuild` | Delete and regenerate all embeddings |
//! | `simscan index` | Idempotently create the nearest-neighbor index |
//! | `simscan detect <file>` | Score a plain-text submission |
//! | `simscan search "<query>"` | Find reference sources near a query |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use simscan::{config, db, detect, ingest, maintain, migrate, search};

/// Simscan — semantic chunk-similarity plagiarism detection.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/simscan.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "simscan",
    about = "Simscan — semantic chunk-similarity plagiarism detection",
    version,
    long_about = "Simscan chunks a submission on sentence boundaries, embeds each chunk via a \
    remote embedding provider, retrieves nearest reference sources from a vector-indexed SQLite \
    store, and aggregates per-chunk similarity into a plagiarism score with flagged evidence."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/simscan.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (sources,
    /// index_lists, source_lists). Idempotent; running it multiple times
    /// is safe.
    Init,

    /// Ingest reference sources from a JSON corpus file.
    ///
    /// An empty store takes every record; a populated store takes only
    /// titles it has not seen, so repeated loads are idempotent.
    Load {
        /// Path to a JSON array of source records.
        file: PathBuf,
    },

    /// Manage embedding vectors.
    ///
    /// Requires an embedding provider (e.g., huggingface) to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Idempotently create the approximate nearest-neighbor index.
    ///
    /// Trains inverted-list centroids over the embedded corpus and assigns
    /// each embedded source to its nearest list. Safe to call repeatedly;
    /// never rebuilds existing structure.
    Index,

    /// Run plagiarism detection over a plain-text submission file.
    Detect {
        /// Path to the submission text.
        file: PathBuf,

        /// Nearest sources retrieved per chunk (overrides config).
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum similarity for a match to be flagged (overrides config).
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Find reference sources semantically near a query.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed sources that do not have an embedding yet.
    Pending {
        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions. Also clears
    /// the index so it is retrained on the next `index` run.
    Rebuild,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Load { file } => {
            ingest::run_load(&cfg, &file).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { dry_run } => {
                maintain::run_embed_pending(&cfg, dry_run).await?;
            }
            EmbedAction::Rebuild => {
                maintain::run_embed_rebuild(&cfg).await?;
            }
        },
        Commands::Index => {
            maintain::run_index(&cfg).await?;
        }
        Commands::Detect {
            file,
            top_k,
            threshold,
            json,
        } => {
            detect::run_detect(&cfg, &file, top_k, threshold, json).await?;
        }
        Commands::Search { query, top_k } => {
            search::run_search(&cfg, &query, top_k).await?;
        }
    }

    Ok(())
}
