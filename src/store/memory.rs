//! In-memory [`SourceStore`] implementation for tests.
//!
//! Sources live in a `Vec` behind `std::sync::RwLock`; vector search is
//! brute-force cosine similarity over every embedded source. There is no
//! index structure, so [`ensure_index`](SourceStore::ensure_index) is a
//! no-op that is trivially idempotent.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{NewSource, SourceDocument, SourceHit};

use super::SourceStore;

/// Brute-force store used by unit and scenario tests.
pub struct InMemoryStore {
    sources: RwLock<Vec<SourceDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Seed a source that already has an embedding, bypassing the
    /// maintenance pipeline. Test convenience only.
    pub fn seed_embedded(&self, title: &str, abstract_text: &str, embedding: Vec<f32>) -> i64 {
        let mut sources = self.sources.write().unwrap();
        let id = sources.len() as i64 + 1;
        sources.push(SourceDocument {
            id,
            title: title.to_string(),
            authors: None,
            year: None,
            abstract_text: abstract_text.to_string(),
            full_text: String::new(),
            source_type: "paper".to_string(),
            embedding: Some(embedding),
        });
        id
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceStore for InMemoryStore {
    async fn insert_source(&self, source: &NewSource) -> Result<i64> {
        let mut sources = self.sources.write().unwrap();
        let id = sources.len() as i64 + 1;
        sources.push(SourceDocument {
            id,
            title: source.title.clone(),
            authors: source.authors.clone(),
            year: source.publication_year,
            abstract_text: source.abstract_text.clone().unwrap_or_default(),
            full_text: source.full_text.clone().unwrap_or_default(),
            source_type: source
                .source_type
                .clone()
                .unwrap_or_else(|| "paper".to_string()),
            embedding: None,
        });
        Ok(id)
    }

    async fn count_sources(&self) -> Result<i64> {
        Ok(self.sources.read().unwrap().len() as i64)
    }

    async fn existing_titles(&self) -> Result<HashSet<String>> {
        Ok(self
            .sources
            .read()
            .unwrap()
            .iter()
            .map(|s| s.title.clone())
            .collect())
    }

    async fn missing_embeddings(&self) -> Result<Vec<SourceDocument>> {
        Ok(self
            .sources
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.embedding.is_none())
            .cloned()
            .collect())
    }

    async fn upsert_embedding(&self, source_id: i64, vector: &[f32]) -> Result<()> {
        let mut sources = self.sources.write().unwrap();
        let source = sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| anyhow::anyhow!("unknown source id {}", source_id))?;
        source.embedding = Some(vector.to_vec());
        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        for source in self.sources.write().unwrap().iter_mut() {
            source.embedding = None;
        }
        Ok(())
    }

    async fn ensure_index(&self) -> Result<()> {
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SourceHit>> {
        let sources = self.sources.read().unwrap();
        let mut hits: Vec<SourceHit> = sources
            .iter()
            .filter_map(|s| {
                let embedding = s.embedding.as_ref()?;
                Some(SourceHit {
                    id: s.id,
                    title: s.title.clone(),
                    abstract_text: s.abstract_text.clone(),
                    similarity: cosine_similarity(vector, embedding) as f64,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}
