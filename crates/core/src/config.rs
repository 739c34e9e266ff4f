//! Configuration management for the Diligence engine.
//!
//! This module handles loading and merging configuration from multiple
//! sources:
//! - Environment variables (`DILIGENCE_*`)
//! - Command-line flags
//! - An optional YAML config file
//!
//! The resulting [`EngineConfig`] is passed explicitly through constructors;
//! there is no process-wide configuration singleton.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Main engine configuration.
///
/// Holds everything that affects chunking, retrieval, generation, and the
/// lifecycle of the vector index and relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite store
    pub store_path: PathBuf,

    /// LLM completion provider (e.g. "ollama", "openai")
    pub provider: String,

    /// Completion model identifier
    pub model: String,

    /// Custom provider endpoint URL
    pub endpoint: Option<String>,

    /// API key for providers that require one
    pub api_key: Option<String>,

    /// Embedding provider ("hashed-ngram", "ollama")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Embedding vector dimensions
    pub embedding_dimensions: usize,

    /// Chunk window size in characters
    pub chunk_window: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Temperature for the first ("precise") candidate call
    pub temperature_precise: f32,

    /// Temperature for the second ("exploratory") candidate call
    pub temperature_exploratory: f32,

    /// Temperature for the merge call
    pub temperature_merge: f32,

    /// Maximum completion tokens per call
    pub max_tokens: u32,

    /// Retries per LLM call after the initial attempt
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles per attempt)
    pub backoff_ms: u64,

    /// Per-call timeout in seconds; a timed-out call counts as a transport
    /// failure for retry purposes
    pub call_timeout_secs: u64,

    /// Worker pool size for batch generation
    pub batch_pool_size: usize,

    /// Use the approximate graph for unscoped searches instead of the
    /// exact scan
    pub approximate_search: bool,

    /// Whether regenerating a reviewed (confirmed/rejected/manual) answer
    /// is permitted; when false such a request is a conflict
    pub allow_regenerate_reviewed: bool,

    /// Log level override
    pub log_level: Option<String>,

    /// Disable colored output
    pub no_color: bool,
}

/// YAML config file structure (all sections optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    chunking: Option<ChunkingSection>,
    generation: Option<GenerationSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "embeddingProvider")]
    embedding_provider: Option<String>,
    #[serde(rename = "embeddingModel")]
    embedding_model: Option<String>,
    #[serde(rename = "embeddingDimensions")]
    embedding_dimensions: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkingSection {
    window: Option<usize>,
    overlap: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenerationSection {
    #[serde(rename = "topK")]
    top_k: Option<usize>,
    #[serde(rename = "temperaturePrecise")]
    temperature_precise: Option<f32>,
    #[serde(rename = "temperatureExploratory")]
    temperature_exploratory: Option<f32>,
    #[serde(rename = "temperatureMerge")]
    temperature_merge: Option<f32>,
    #[serde(rename = "maxRetries")]
    max_retries: Option<u32>,
    #[serde(rename = "timeoutSecs")]
    timeout_secs: Option<u64>,
    #[serde(rename = "poolSize")]
    pool_size: Option<usize>,
    #[serde(rename = "allowRegenerateReviewed")]
    allow_regenerate_reviewed: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("diligence.db"),
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            embedding_provider: "hashed-ngram".to_string(),
            embedding_model: "hashed-ngram-v1".to_string(),
            embedding_dimensions: 384,
            chunk_window: 500,
            chunk_overlap: 80,
            top_k: 8,
            temperature_precise: 0.7,
            temperature_exploratory: 0.9,
            temperature_merge: 0.3,
            max_tokens: 1024,
            max_retries: 2,
            backoff_ms: 500,
            call_timeout_secs: 60,
            batch_pool_size: 4,
            approximate_search: false,
            allow_regenerate_reviewed: true,
            log_level: None,
            no_color: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables and an optional YAML
    /// config file.
    ///
    /// Environment variables:
    /// - `DILIGENCE_STORE`: SQLite store path
    /// - `DILIGENCE_CONFIG`: path to a YAML config file
    /// - `DILIGENCE_PROVIDER`: completion provider
    /// - `DILIGENCE_MODEL`: completion model
    /// - `DILIGENCE_ENDPOINT`: provider endpoint URL
    /// - `DILIGENCE_API_KEY`: provider API key
    /// - `RUST_LOG`: log level
    /// - `NO_COLOR`: disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // YAML first so environment variables can override it
        if let Ok(path) = std::env::var("DILIGENCE_CONFIG") {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(AppError::Config(format!(
                    "Config file does not exist: {:?}",
                    path
                )));
            }
            config = config.merge_yaml(&path)?;
        }

        if let Ok(store) = std::env::var("DILIGENCE_STORE") {
            config.store_path = PathBuf::from(store);
        }
        if let Ok(provider) = std::env::var("DILIGENCE_PROVIDER") {
            config.provider = provider;
        }
        if let Ok(model) = std::env::var("DILIGENCE_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("DILIGENCE_ENDPOINT") {
            config.endpoint = Some(endpoint);
        }
        config.api_key = std::env::var("DILIGENCE_API_KEY").ok().or(config.api_key);
        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(llm) = file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
            if let Some(ep) = llm.embedding_provider {
                result.embedding_provider = ep;
            }
            if let Some(em) = llm.embedding_model {
                result.embedding_model = em;
            }
            if let Some(dims) = llm.embedding_dimensions {
                result.embedding_dimensions = dims;
            }
        }

        if let Some(chunking) = file.chunking {
            if let Some(window) = chunking.window {
                result.chunk_window = window;
            }
            if let Some(overlap) = chunking.overlap {
                result.chunk_overlap = overlap;
            }
        }

        if let Some(gen) = file.generation {
            if let Some(top_k) = gen.top_k {
                result.top_k = top_k;
            }
            if let Some(t) = gen.temperature_precise {
                result.temperature_precise = t;
            }
            if let Some(t) = gen.temperature_exploratory {
                result.temperature_exploratory = t;
            }
            if let Some(t) = gen.temperature_merge {
                result.temperature_merge = t;
            }
            if let Some(r) = gen.max_retries {
                result.max_retries = r;
            }
            if let Some(t) = gen.timeout_secs {
                result.call_timeout_secs = t;
            }
            if let Some(p) = gen.pool_size {
                result.batch_pool_size = p;
            }
            if let Some(a) = gen.allow_regenerate_reviewed {
                result.allow_regenerate_reviewed = a;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the
    /// config file.
    pub fn with_overrides(
        mut self,
        store: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(store) = store {
            self.store_path = store;
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_window == 0 {
            return Err(AppError::Config("Chunk window must be positive".to_string()));
        }

        if self.chunk_overlap >= self.chunk_window {
            return Err(AppError::Config(format!(
                "Chunk overlap ({}) must be smaller than the window ({})",
                self.chunk_overlap, self.chunk_window
            )));
        }

        if self.batch_pool_size == 0 {
            return Err(AppError::Config(
                "Batch pool size must be at least 1".to_string(),
            ));
        }

        let known_providers = ["ollama", "openai"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.provider == "openai" && self.api_key.is_none() {
            return Err(AppError::Config(
                "Provider 'openai' requires DILIGENCE_API_KEY".to_string(),
            ));
        }

        Ok(())
    }
}
