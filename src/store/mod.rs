//! Storage abstraction for the reference-source corpus.
//!
//! The [`SourceStore`] trait defines every operation the detection and
//! maintenance pipelines need, enabling pluggable backends (SQLite,
//! in-memory for tests).
//!
//! The store exclusively owns [`SourceDocument`] records and their
//! embeddings. The detector only reads; the indexing maintainer is the
//! only writer of embeddings. Implementations must be `Send + Sync` and
//! support concurrent read-only queries.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewSource, SourceDocument, SourceHit};

/// Abstract storage backend for reference sources and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_source`](SourceStore::insert_source) | Add a reference source (no embedding yet) |
/// | [`count_sources`](SourceStore::count_sources) | Total stored sources |
/// | [`existing_titles`](SourceStore::existing_titles) | Titles present, for ingestion dedup |
/// | [`missing_embeddings`](SourceStore::missing_embeddings) | Sources still lacking a vector |
/// | [`upsert_embedding`](SourceStore::upsert_embedding) | Store/replace one source's vector |
/// | [`clear_embeddings`](SourceStore::clear_embeddings) | Drop every stored vector |
/// | [`ensure_index`](SourceStore::ensure_index) | Idempotently create the ANN index |
/// | [`query`](SourceStore::query) | Nearest sources by cosine similarity |
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Insert a reference source without an embedding. Returns the new id.
    async fn insert_source(&self, source: &NewSource) -> Result<i64>;

    /// Number of sources in the corpus, embedded or not.
    async fn count_sources(&self) -> Result<i64>;

    /// Titles already present, used to skip duplicates during ingestion.
    async fn existing_titles(&self) -> Result<HashSet<String>>;

    /// Sources that do not yet have an embedding, in id order.
    async fn missing_embeddings(&self) -> Result<Vec<SourceDocument>>;

    /// Store or replace the embedding for one source.
    async fn upsert_embedding(&self, source_id: i64, vector: &[f32]) -> Result<()>;

    /// Drop all stored embeddings (and any index built over them).
    async fn clear_embeddings(&self) -> Result<()>;

    /// Idempotently create the approximate nearest-neighbor index used by
    /// [`query`](SourceStore::query). Safe to call repeatedly; never
    /// rebuilds existing structure.
    async fn ensure_index(&self) -> Result<()>;

    /// Nearest sources to `vector` by cosine similarity, best first, at
    /// most `top_k` rows. Sources without an embedding never participate.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SourceHit>>;
}
