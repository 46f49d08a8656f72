//! Reference-source ingestion from a JSON corpus file.
//!
//! Loads an array of source records into the store. An empty store takes
//! every record; a populated store takes only titles it has not seen,
//! so repeated loads are idempotent. Per-record failures are logged and
//! skipped. Embeddings are not computed here; that is the indexing
//! maintainer's job.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::models::NewSource;
use crate::store::sqlite::SqliteStore;
use crate::store::SourceStore;

/// Outcome of one ingestion pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadSummary {
    pub added: u64,
    pub skipped: u64,
}

/// Load reference sources from a JSON file into the store.
pub async fn load_sources<S: SourceStore + ?Sized>(
    store: &S,
    path: &Path,
) -> Result<LoadSummary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file: {}", path.display()))?;
    let records: Vec<NewSource> =
        serde_json::from_str(&content).with_context(|| "Failed to parse sources file")?;

    let mut existing = if store.count_sources().await? == 0 {
        Default::default()
    } else {
        store.existing_titles().await?
    };

    let mut summary = LoadSummary::default();

    for record in &records {
        if record.title.trim().is_empty() {
            tracing::warn!("skipping source with empty title");
            summary.skipped += 1;
            continue;
        }
        if existing.contains(&record.title) {
            summary.skipped += 1;
            continue;
        }
        match store.insert_source(record).await {
            Ok(id) => {
                tracing::info!(source = id, title = %record.title, "added source");
                existing.insert(record.title.clone());
                summary.added += 1;
            }
            Err(e) => {
                tracing::warn!(title = %record.title, error = %e, "failed to insert source");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// `simscan load <file>` — ingest reference sources from JSON.
pub async fn run_load(config: &Config, path: &Path) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteStore::new(pool.clone(), config.index.clone());

    let summary = load_sources(&store, path).await?;

    println!("load sources");
    println!("  added: {}", summary.added);
    println!("  skipped: {}", summary.skipped);

    pool.close().await;
    Ok(())
}
