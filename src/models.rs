//! Core data models for the detection pipeline.
//!
//! These types represent the reference sources, submission chunks, and
//! detection results that flow through chunking, embedding, retrieval,
//! and scoring.

use serde::{Deserialize, Serialize};

/// A reference document in the academic-source corpus.
///
/// Owned exclusively by the source store. `embedding` is `None` until the
/// indexing maintainer computes one; when present it is exactly the
/// configured number of dimensions.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub id: i64,
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i64>,
    pub abstract_text: String,
    pub full_text: String,
    pub source_type: String,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

/// A reference source as it arrives from an ingestion file, before it has
/// an id or an embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSource {
    pub title: String,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i64>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

/// A bounded span of submission text, the unit of embedding and comparison.
///
/// Transient: chunks exist only within one detection run and are never
/// persisted. `index` is 1-based and contiguous; `token_count` is the
/// whitespace-delimited word count, not a tokenizer's count.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

/// One row returned from a similarity query: a source plus its cosine
/// similarity to the query vector, unrounded.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHit {
    pub id: i64,
    pub title: String,
    pub abstract_text: String,
    pub similarity: f64,
}

/// A chunk/source pair whose similarity met the detection threshold.
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedSection {
    /// 1-based index of the chunk within the submission.
    pub chunk_index: usize,
    /// Cosine similarity, rounded to four decimal places.
    pub similarity: f64,
    pub source_id: i64,
    pub source_title: String,
    /// First 200 characters of the chunk, for human review.
    pub excerpt: String,
}

/// The outcome of one detection run.
///
/// `plagiarism_score` is in `[0.0, 100.0]`: the mean similarity of flagged
/// sections scaled to a percentage, or exactly `0.0` when nothing was
/// flagged. Persisting the report is the caller's concern.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub plagiarism_score: f64,
    pub flagged_sections: Vec<FlaggedSection>,
}
