//! Semantic similarity search over the reference corpus.
//!
//! Embeds a free-text query and returns the nearest sources. This is the
//! standalone counterpart of the per-chunk retrieval the detector performs,
//! useful for corpus inspection and for suggesting related sources.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::models::SourceHit;
use crate::store::sqlite::SqliteStore;
use crate::store::SourceStore;

/// Nearest sources to a free-text query, best first.
///
/// Empty queries return no results rather than erroring.
pub async fn search_sources<S: SourceStore + ?Sized>(
    store: &S,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    top_k: usize,
) -> Result<Vec<SourceHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let vector = embedder
        .embed(query)
        .await
        .context("failed to embed query")?;
    store.query(&vector, top_k).await
}

/// `simscan search <query>` — print the nearest reference sources.
pub async fn run_search(config: &Config, query: &str, top_k: usize) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteStore::new(pool.clone(), config.index.clone());

    let hits = search_sources(&store, provider.as_ref(), query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.similarity, hit.title);
        let preview: String = hit.abstract_text.chars().take(160).collect();
        if !preview.is_empty() {
            println!("    abstract: \"{}\"", preview.replace('\n', " "));
        }
        println!("    id: {}", hit.id);
        println!();
    }

    pool.close().await;
    Ok(())
}
