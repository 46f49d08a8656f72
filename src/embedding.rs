//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`HuggingFaceProvider`]** — calls the Hugging Face inference API with
//!   input truncation, bounded retry, and response normalization.
//!
//! Also provides vector utilities shared with the SQLite store:
//! - [`cosine_similarity`] — compute similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — encode/decode a `Vec<f32>` as
//!   little-endian bytes for SQLite BLOB storage
//!
//! # Retry Strategy
//!
//! Every provider call is retried up to a fixed attempt budget with a fixed
//! inter-attempt delay; any transport or provider error counts as a failed
//! attempt. Exhausting the budget yields
//! [`DetectError::EmbeddingUnavailable`], which callers treat as fatal for
//! that one chunk or document, never for the whole batch. The policy is
//! injectable so tests run without real sleeps.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::DetectError;

/// Retry schedule for one embedding call: attempt budget plus a fixed delay
/// slept between consecutive attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Zero-delay policy, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Trait for embedding providers.
///
/// One instance is constructed at process start and reused for every call;
/// there is no per-call reconfiguration.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a single text span into a fixed-dimension vector.
    ///
    /// Input longer than the provider's character budget is truncated before
    /// sending; callers must not assume the full text was embedded.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration. The
/// detector still completes against it: every chunk fails, is logged, and
/// is skipped.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, DetectError> {
        Err(DetectError::EmbeddingUnavailable {
            attempts: 0,
            reason: "embedding provider is disabled".to_string(),
        })
    }
}

// ============ Hugging Face Provider ============

/// Embedding provider using the Hugging Face inference API.
///
/// Calls the feature-extraction pipeline for the configured model.
/// Requires the `HUGGINGFACE_API_KEY` environment variable to be set.
pub struct HuggingFaceProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    max_input_chars: usize,
}

impl HuggingFaceProvider {
    /// Create a new Hugging Face provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `HUGGINGFACE_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Hugging Face provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Hugging Face provider"))?;

        let api_key = std::env::var("HUGGINGFACE_API_KEY")
            .map_err(|_| anyhow!("HUGGINGFACE_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            retry: RetryPolicy::from_config(config),
            max_input_chars: config.max_input_chars,
        })
    }

    /// Override the retry policy (used by tests to drop the delay).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>> {
        let url = format!(
            "https://api-inference.huggingface.co/pipeline/feature-extraction/{}",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({ "inputs": input }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("inference API error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        normalize_embedding(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, DetectError> {
        let input = truncate_chars(text, self.max_input_chars);
        let mut last_err = String::new();

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay).await;
            }

            match self.request(input).await {
                Ok(vector) => {
                    if vector.len() != self.dims {
                        // Wrong model or wrong config; retrying won't help.
                        return Err(DetectError::EmbeddingUnavailable {
                            attempts: attempt,
                            reason: format!(
                                "provider returned {} dims, expected {}",
                                vector.len(),
                                self.dims
                            ),
                        });
                    }
                    return Ok(vector);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %e,
                        "embedding attempt failed"
                    );
                    last_err = e.to_string();
                }
            }
        }

        Err(DetectError::EmbeddingUnavailable {
            attempts: self.retry.max_attempts,
            reason: last_err,
        })
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the Hugging Face
/// provider cannot be initialized (missing config or API key).
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "huggingface" => Ok(Box::new(HuggingFaceProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Unwrap a feature-extraction response into one flat vector of floats.
///
/// The API returns either a flat `[f32]` or a batch-of-one `[[f32]]`
/// depending on model and input shape; both normalize to the inner vector.
pub fn normalize_embedding(value: &serde_json::Value) -> Result<Vec<f32>> {
    let outer = value
        .as_array()
        .ok_or_else(|| anyhow!("embedding response is not an array"))?;

    let flat = match outer.first() {
        Some(serde_json::Value::Array(inner)) => inner,
        _ => outer,
    };

    flat.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("non-numeric value in embedding response"))
        })
        .collect()
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a BLOB
/// of `vec.len() × 4` bytes. This is the store's wire representation for
/// vectors; callers never format vectors themselves.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values from
/// the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_ascii() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
        assert_eq!(truncate_chars("hi", 5), "hi");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let s = "αβγδε";
        assert_eq!(truncate_chars(s, 3), "αβγ");
        assert_eq!(truncate_chars(s, 10), s);
    }

    #[test]
    fn test_normalize_flat_response() {
        let json = serde_json::json!([0.1, -0.2, 0.3]);
        let vec = normalize_embedding(&json).unwrap();
        assert_eq!(vec.len(), 3);
        assert!((vec[1] - (-0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_nested_response() {
        let json = serde_json::json!([[0.5, 0.25]]);
        let vec = normalize_embedding(&json).unwrap();
        assert_eq!(vec, vec![0.5, 0.25]);
    }

    #[test]
    fn test_normalize_rejects_non_array() {
        let json = serde_json::json!({"error": "loading"});
        assert!(normalize_embedding(&json).is_err());
    }

    #[test]
    fn test_normalize_rejects_non_numeric() {
        let json = serde_json::json!(["a", "b"]);
        assert!(normalize_embedding(&json).is_err());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let err = DisabledProvider.embed("anything").await.unwrap_err();
        assert!(matches!(err, DetectError::EmbeddingUnavailable { .. }));
    }
}
