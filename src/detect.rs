//! Plagiarism detection orchestration: chunk → embed → retrieve → flag → score.
//!
//! [`detect_plagiarism`] is the core entry point consumed by the CLI (and by
//! any surrounding request layer). It never fails once input validation
//! passes: per-chunk embedding or retrieval errors are logged with the chunk
//! index and the chunk is skipped, so one bad chunk cannot abort the
//! document. Empty input short-circuits to a zero-score report.
//!
//! # Scoring policy
//!
//! `plagiarism_score` is the mean similarity of all flagged sections scaled
//! to a percentage. It measures the average *strength* of flagged matches,
//! not what fraction of the document was flagged: one near-exact paragraph
//! among nine original ones scores the same as a document copied throughout
//! in equally-strong fragments. This severity weighting is deliberate and
//! kept as a tunable policy rather than silently replaced with a
//! coverage-weighted formula.

use crate::chunk::chunk_text;
use crate::embedding::EmbeddingProvider;
use crate::error::DetectError;
use crate::models::{Chunk, DetectionReport, FlaggedSection};
use crate::store::SourceStore;

/// Characters of chunk text carried on a flagged section for human review.
pub const EXCERPT_CHARS: usize = 200;

/// Tuning for one detection run.
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    /// Maximum words per chunk.
    pub max_tokens: usize,
    /// Nearest sources retrieved per chunk.
    pub top_k: usize,
    /// Minimum cosine similarity for a match to be flagged.
    pub similarity_threshold: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            top_k: 3,
            similarity_threshold: 0.6,
        }
    }
}

/// Run plagiarism detection over one submission.
///
/// Chunks the text, embeds each chunk, queries the store for the `top_k`
/// nearest reference sources, flags matches at or above the similarity
/// threshold, and aggregates flagged similarities into a document score.
///
/// `flagged_sections` preserves chunk order; within one chunk, matches keep
/// the store's descending-similarity order.
pub async fn detect_plagiarism<S: SourceStore + ?Sized>(
    store: &S,
    embedder: &dyn EmbeddingProvider,
    text: &str,
    params: &DetectionParams,
) -> DetectionReport {
    let chunks = chunk_text(text, params.max_tokens);
    if chunks.is_empty() {
        return DetectionReport {
            plagiarism_score: 0.0,
            flagged_sections: Vec::new(),
        };
    }

    tracing::info!(chunks = chunks.len(), "processing submission");

    let mut flagged_sections = Vec::new();
    for chunk in &chunks {
        match scan_chunk(store, embedder, chunk, params).await {
            Ok(mut sections) => flagged_sections.append(&mut sections),
            Err(e) => {
                tracing::warn!(chunk = chunk.index, error = %e, "skipping chunk");
            }
        }
    }

    let plagiarism_score = compute_score(&flagged_sections);

    tracing::info!(
        flagged = flagged_sections.len(),
        score = plagiarism_score,
        "detection complete"
    );

    DetectionReport {
        plagiarism_score,
        flagged_sections,
    }
}

/// Embed one chunk, query its neighbors, and flag those over threshold.
async fn scan_chunk<S: SourceStore + ?Sized>(
    store: &S,
    embedder: &dyn EmbeddingProvider,
    chunk: &Chunk,
    params: &DetectionParams,
) -> Result<Vec<FlaggedSection>, DetectError> {
    let vector = embedder.embed(&chunk.text).await?;
    let hits = store
        .query(&vector, params.top_k)
        .await
        .map_err(|e| DetectError::Retrieval(e.to_string()))?;

    Ok(hits
        .into_iter()
        .filter(|hit| hit.similarity >= params.similarity_threshold)
        .map(|hit| FlaggedSection {
            chunk_index: chunk.index,
            similarity: round4(hit.similarity),
            source_id: hit.id,
            source_title: hit.title,
            excerpt: excerpt(&chunk.text),
        })
        .collect())
}

/// Mean of the flagged similarities × 100, rounded to two decimals.
/// Exactly `0.0` when nothing was flagged; never a mean over an empty set.
fn compute_score(flagged: &[FlaggedSection]) -> f64 {
    if flagged.is_empty() {
        return 0.0;
    }
    let mean = flagged.iter().map(|f| f.similarity).sum::<f64>() / flagged.len() as f64;
    round2(mean * 100.0)
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============ CLI entry point ============

/// `simscan detect <file>` — run detection over a plain-text submission.
pub async fn run_detect(
    config: &crate::config::Config,
    file: &std::path::Path,
    top_k: Option<usize>,
    threshold: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read submission: {}", file.display()))?;

    let provider = crate::embedding::create_provider(&config.embedding)?;
    let pool = crate::db::connect(&config.db.path).await?;
    let store = crate::store::sqlite::SqliteStore::new(pool.clone(), config.index.clone());

    let params = DetectionParams {
        max_tokens: config.chunking.max_tokens,
        top_k: top_k.unwrap_or(config.detection.top_k),
        similarity_threshold: threshold.unwrap_or(config.detection.similarity_threshold),
    };

    let report = detect_plagiarism(&store, provider.as_ref(), &text, &params).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("plagiarism detection");
        println!("  sections flagged: {}", report.flagged_sections.len());
        println!("  overall score: {:.2}%", report.plagiarism_score);
        for flagged in &report.flagged_sections {
            println!(
                "  [chunk {}] {:.4} — {} (source {})",
                flagged.chunk_index, flagged.similarity, flagged.source_title, flagged.source_id
            );
        }
    }

    pool.close().await;
    Ok(())
}
