//! SQLite-backed [`SourceStore`] with an inverted-file ANN index.
//!
//! Embeddings are stored as little-endian f32 BLOBs on the `sources` table.
//! [`ensure_index`](SourceStore::ensure_index) trains a bounded k-means
//! clustering over the embedded corpus and records one centroid per
//! inverted list (`index_lists`) plus a source → list assignment
//! (`source_lists`). Queries then probe only the `nprobe` lists whose
//! centroids are nearest the query vector, scoring candidates with exact
//! cosine similarity in Rust.
//!
//! The index is approximate by design: a true nearest neighbor living in an
//! unprobed list is missed. The consumer only needs "is there a close
//! enough match", so recall is traded for bounded scan cost. Sources
//! embedded after training stay unassigned until the next
//! `ensure_index` call; queries include unassigned sources so fresh
//! embeddings are never invisible.

use std::collections::HashSet;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::IndexConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{NewSource, SourceDocument, SourceHit};

use super::SourceStore;

/// Lloyd refinement passes after seeding. Centroids stabilize quickly on
/// normalized sentence embeddings; more passes buy little.
const KMEANS_ITERATIONS: usize = 8;

pub struct SqliteStore {
    pool: SqlitePool,
    index: IndexConfig,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, index: IndexConfig) -> Self {
        Self { pool, index }
    }

    async fn load_embedded(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows =
            sqlx::query("SELECT id, embedding FROM sources WHERE embedding IS NOT NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (row.get::<i64, _>("id"), blob_to_vec(&blob))
            })
            .collect())
    }

    async fn load_centroids(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows = sqlx::query("SELECT list_id, centroid FROM index_lists ORDER BY list_id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("centroid");
                (row.get::<i64, _>("list_id"), blob_to_vec(&blob))
            })
            .collect())
    }

    /// Assign embedded sources that have no list yet to their nearest
    /// centroid. No-op when the index has not been trained.
    async fn assign_unlisted(&self, centroids: &[(i64, Vec<f32>)]) -> Result<()> {
        if centroids.is_empty() {
            return Ok(());
        }

        let rows = sqlx::query(
            r#"
            SELECT s.id, s.embedding
            FROM sources s
            LEFT JOIN source_lists sl ON sl.source_id = s.id
            WHERE s.embedding IS NOT NULL AND sl.source_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let source_id: i64 = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let list_id = nearest_list(&vector, centroids);

            sqlx::query("INSERT OR REPLACE INTO source_lists (source_id, list_id) VALUES (?, ?)")
                .bind(source_id)
                .bind(list_id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl SourceStore for SqliteStore {
    async fn insert_source(&self, source: &NewSource) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (title, authors, publication_year, abstract, full_text, source_type)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.title)
        .bind(&source.authors)
        .bind(source.publication_year)
        .bind(source.abstract_text.as_deref().unwrap_or(""))
        .bind(source.full_text.as_deref().unwrap_or(""))
        .bind(source.source_type.as_deref().unwrap_or("paper"))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn count_sources(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn existing_titles(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT title FROM sources")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("title")).collect())
    }

    async fn missing_embeddings(&self) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, authors, publication_year, abstract, full_text, source_type
            FROM sources
            WHERE embedding IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceDocument {
                id: row.get("id"),
                title: row.get("title"),
                authors: row.get("authors"),
                year: row.get("publication_year"),
                abstract_text: row.get("abstract"),
                full_text: row.get("full_text"),
                source_type: row.get("source_type"),
                embedding: None,
            })
            .collect())
    }

    async fn upsert_embedding(&self, source_id: i64, vector: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE sources SET embedding = ?, embedded_at = ? WHERE id = ?")
            .bind(vec_to_blob(vector))
            .bind(now)
            .bind(source_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("unknown source id {}", source_id);
        }

        // The old list assignment no longer matches the new vector; the
        // source stays queryable as unassigned until the next ensure_index.
        sqlx::query("DELETE FROM source_lists WHERE source_id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn clear_embeddings(&self) -> Result<()> {
        sqlx::query("UPDATE sources SET embedding = NULL, embedded_at = NULL")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM source_lists")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM index_lists")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_index(&self) -> Result<()> {
        let mut centroids = self.load_centroids().await?;

        if centroids.is_empty() {
            let embedded = self.load_embedded().await?;
            if embedded.is_empty() || embedded.len() < self.index.min_train {
                tracing::info!(
                    embedded = embedded.len(),
                    min_train = self.index.min_train,
                    "too few embedded sources to train an index; queries scan the full corpus"
                );
                return Ok(());
            }

            let lists = effective_lists(self.index.lists, embedded.len());
            let vectors: Vec<&[f32]> = embedded.iter().map(|(_, v)| v.as_slice()).collect();
            let trained = train_centroids(&vectors, lists, KMEANS_ITERATIONS);

            for (list_id, centroid) in trained.iter().enumerate() {
                sqlx::query("INSERT INTO index_lists (list_id, centroid) VALUES (?, ?)")
                    .bind(list_id as i64)
                    .bind(vec_to_blob(centroid))
                    .execute(&self.pool)
                    .await?;
            }

            tracing::info!(
                lists = trained.len(),
                trained_on = embedded.len(),
                "nearest-neighbor index created"
            );
            centroids = self.load_centroids().await?;
        }

        self.assign_unlisted(&centroids).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SourceHit>> {
        let centroids = self.load_centroids().await?;

        let rows = if centroids.is_empty() {
            sqlx::query(
                r#"
                SELECT id, title, abstract, embedding
                FROM sources
                WHERE embedding IS NOT NULL
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            let probe = probe_lists(vector, &centroids, self.index.nprobe);
            let placeholders = vec!["?"; probe.len()].join(", ");
            // Unassigned sources (embedded since the last ensure_index)
            // ride along with the probed lists.
            let sql = format!(
                r#"
                SELECT s.id, s.title, s.abstract, s.embedding
                FROM sources s
                LEFT JOIN source_lists sl ON sl.source_id = s.id
                WHERE s.embedding IS NOT NULL
                  AND (sl.source_id IS NULL OR sl.list_id IN ({}))
                "#,
                placeholders
            );

            let mut query = sqlx::query(&sql);
            for list_id in &probe {
                query = query.bind(*list_id);
            }
            query.fetch_all(&self.pool).await?
        };

        let mut hits: Vec<SourceHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                SourceHit {
                    id: row.get("id"),
                    title: row.get("title"),
                    abstract_text: row.get("abstract"),
                    similarity: cosine_similarity(vector, &stored) as f64,
                }
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

/// Cap the list count so every list can expect a handful of members;
/// a corpus of N supports at most N/4 lists.
fn effective_lists(configured: usize, embedded: usize) -> usize {
    configured.min(embedded / 4).max(1)
}

fn nearest_list(vector: &[f32], centroids: &[(i64, Vec<f32>)]) -> i64 {
    let mut best = centroids[0].0;
    let mut best_sim = f32::NEG_INFINITY;
    for (list_id, centroid) in centroids {
        let sim = cosine_similarity(vector, centroid);
        if sim > best_sim {
            best_sim = sim;
            best = *list_id;
        }
    }
    best
}

/// The `nprobe` list ids whose centroids are nearest the query vector.
fn probe_lists(vector: &[f32], centroids: &[(i64, Vec<f32>)], nprobe: usize) -> Vec<i64> {
    let mut ranked: Vec<(i64, f32)> = centroids
        .iter()
        .map(|(list_id, centroid)| (*list_id, cosine_similarity(vector, centroid)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(nprobe);
    ranked.into_iter().map(|(list_id, _)| list_id).collect()
}

/// Bounded k-means over the embedded corpus.
///
/// Seeding strides evenly through the vectors (in id order) so training is
/// deterministic; each Lloyd pass assigns by cosine similarity and moves
/// every centroid to the mean of its members. An emptied list keeps its
/// previous centroid.
fn train_centroids(vectors: &[&[f32]], k: usize, iterations: usize) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let k = k.min(n).max(1);
    let dims = vectors[0].len();

    let mut centroids: Vec<Vec<f32>> = (0..k).map(|i| vectors[i * n / k].to_vec()).collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0.0f32; dims]; k];
        let mut counts = vec![0usize; k];

        for vector in vectors {
            let mut best = 0;
            let mut best_sim = f32::NEG_INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let sim = cosine_similarity(vector, centroid);
                if sim > best_sim {
                    best_sim = sim;
                    best = c;
                }
            }
            for (sum, x) in sums[best].iter_mut().zip(vector.iter()) {
                *sum += x;
            }
            counts[best] += 1;
        }

        for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            if count > 0 {
                centroids[c] = sum.into_iter().map(|x| x / count as f32).collect();
            }
        }
    }

    centroids
}
