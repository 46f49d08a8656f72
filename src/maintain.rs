//! Source indexing maintenance: embedding backfill and index creation.
//!
//! These operations keep the similarity store populated and indexed. They
//! run on demand (or at process startup), never on the per-detection hot
//! path, and may run concurrently with detection queries: a source
//! mid-transition from "no embedding" to "has embedding" is simply absent
//! from results until committed.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::store::sqlite::SqliteStore;
use crate::store::SourceStore;

/// Outcome of one backfill pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillSummary {
    pub embedded: u64,
    pub failed: u64,
}

/// Compute an embedding for every source that lacks one.
///
/// Each source is embedded from `"{title}. {abstract}"`. A failure on one
/// document is logged and skipped, never fatal to the batch; a second
/// consecutive run finds nothing pending and performs no writes.
pub async fn backfill_embeddings<S: SourceStore + ?Sized>(
    store: &S,
    embedder: &dyn EmbeddingProvider,
) -> Result<BackfillSummary> {
    let pending = store.missing_embeddings().await?;
    tracing::info!(count = pending.len(), "sources needing embeddings");

    let mut summary = BackfillSummary::default();

    for source in &pending {
        let text = format!("{}. {}", source.title, source.abstract_text);
        match embedder.embed(&text).await {
            Ok(vector) => match store.upsert_embedding(source.id, &vector).await {
                Ok(()) => {
                    tracing::info!(source = source.id, title = %source.title, "embedded");
                    summary.embedded += 1;
                }
                Err(e) => {
                    tracing::warn!(source = source.id, error = %e, "failed to store embedding");
                    summary.failed += 1;
                }
            },
            Err(e) => {
                tracing::warn!(source = source.id, error = %e, "failed to embed source");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Drop every stored embedding (and the index built over them), then
/// backfill the whole corpus. For model or dimension changes.
pub async fn rebuild_embeddings<S: SourceStore + ?Sized>(
    store: &S,
    embedder: &dyn EmbeddingProvider,
) -> Result<BackfillSummary> {
    store.clear_embeddings().await?;
    tracing::info!("cleared existing embeddings");
    backfill_embeddings(store, embedder).await
}

/// Idempotently create the store's nearest-neighbor index.
pub async fn ensure_index<S: SourceStore + ?Sized>(store: &S) -> Result<()> {
    store.ensure_index().await
}

// ============ CLI entry points ============

/// `simscan embed pending` — backfill missing embeddings.
pub async fn run_embed_pending(config: &Config, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")?;
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteStore::new(pool.clone(), config.index.clone());

    if dry_run {
        let pending = store.missing_embeddings().await?;
        println!("embed pending (dry-run)");
        println!("  sources needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    let summary = backfill_embeddings(&store, provider.as_ref()).await?;

    println!("embed pending");
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);

    pool.close().await;
    Ok(())
}

/// `simscan embed rebuild` — clear all embeddings and regenerate.
pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")?;
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteStore::new(pool.clone(), config.index.clone());

    let summary = rebuild_embeddings(&store, provider.as_ref()).await?;

    println!("embed rebuild");
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);

    pool.close().await;
    Ok(())
}

/// `simscan index` — ensure the nearest-neighbor index exists.
pub async fn run_index(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = SqliteStore::new(pool.clone(), config.index.clone());

    ensure_index(&store).await?;
    println!("Vector index created or already exists.");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;
    use crate::models::NewSource;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingEmbedder {
        calls: AtomicU64,
        fail_contains: Option<&'static str>,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail_contains: None,
            }
        }

        fn failing_on(needle: &'static str) -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail_contains: Some(needle),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(needle) = self.fail_contains {
                if text.contains(needle) {
                    return Err(DetectError::EmbeddingUnavailable {
                        attempts: 3,
                        reason: "stubbed outage".to_string(),
                    });
                }
            }
            Ok(vec![1.0, 0.0])
        }
    }

    fn source(title: &str) -> NewSource {
        NewSource {
            title: title.to_string(),
            authors: None,
            publication_year: None,
            abstract_text: Some(format!("About {}", title)),
            full_text: None,
            source_type: None,
        }
    }

    #[tokio::test]
    async fn test_backfill_then_noop() {
        let store = InMemoryStore::new();
        store.insert_source(&source("Alpha")).await.unwrap();
        store.insert_source(&source("Beta")).await.unwrap();

        let embedder = CountingEmbedder::new();
        let first = backfill_embeddings(&store, &embedder).await.unwrap();
        assert_eq!(first.embedded, 2);
        assert_eq!(first.failed, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        // Second run: nothing pending, no provider calls, no writes.
        let second = backfill_embeddings(&store, &embedder).await.unwrap();
        assert_eq!(second.embedded, 0);
        assert_eq!(second.failed, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backfill_skips_failures() {
        let store = InMemoryStore::new();
        store.insert_source(&source("Good")).await.unwrap();
        store.insert_source(&source("Poison")).await.unwrap();
        store.insert_source(&source("Fine")).await.unwrap();

        let embedder = CountingEmbedder::failing_on("Poison");
        let summary = backfill_embeddings(&store, &embedder).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(summary.failed, 1);

        // The failed source is still pending for the next pass.
        let missing = store.missing_embeddings().await.unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].title, "Poison");
    }

    #[tokio::test]
    async fn test_rebuild_reembeds_everything() {
        let store = InMemoryStore::new();
        store.insert_source(&source("Alpha")).await.unwrap();
        store.insert_source(&source("Beta")).await.unwrap();

        let embedder = CountingEmbedder::new();
        backfill_embeddings(&store, &embedder).await.unwrap();

        let summary = rebuild_embeddings(&store, &embedder).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    }
}
