use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_similarity_threshold() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    1000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Tuning for the approximate nearest-neighbor index.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Number of inverted lists (clusters) to train.
    #[serde(default = "default_lists")]
    pub lists: usize,
    /// Number of nearest lists probed per query.
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
    /// Minimum embedded sources before an index is trained; below this,
    /// queries fall back to a full scan.
    #[serde(default = "default_min_train")]
    pub min_train: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lists: default_lists(),
            nprobe: default_nprobe(),
            min_train: default_min_train(),
        }
    }
}

fn default_lists() -> usize {
    100
}
fn default_nprobe() -> usize {
    4
}
fn default_min_train() -> usize {
    64
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.detection.top_k < 1 {
        anyhow::bail!("detection.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.detection.similarity_threshold) {
        anyhow::bail!("detection.similarity_threshold must be in [0.0, 1.0]");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.max_attempts == 0 {
            anyhow::bail!("embedding.max_attempts must be >= 1");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "huggingface" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or huggingface.",
            other
        ),
    }

    if config.index.lists < 1 {
        anyhow::bail!("index.lists must be >= 1");
    }
    if config.index.nprobe < 1 {
        anyhow::bail!("index.nprobe must be >= 1");
    }

    Ok(config)
}
