//! Error taxonomy for per-unit failures in the detection pipeline.

use thiserror::Error;

/// A failure scoped to a single chunk or a single reference document.
///
/// Both variants are caught at the unit level, logged with the chunk index
/// or source id, and converted into "skip this unit"; they never abort a
/// whole detection or backfill run.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The embedding provider failed after exhausting its retry budget.
    #[error("embedding unavailable after {attempts} attempt(s): {reason}")]
    EmbeddingUnavailable { attempts: u32, reason: String },

    /// The similarity query against the source store failed.
    #[error("similarity retrieval failed: {0}")]
    Retrieval(String),
}
