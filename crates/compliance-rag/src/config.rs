//! Configuration for the compliance RAG core
//!
//! Every section has a `Default`; a TOML file may override any subset of
//! fields and the documented environment variables are applied on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "COMPLIANCE_RAG_CONFIG";

/// Main RAG system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Vector index persistence
    pub vector_db: VectorDbConfig,
    /// Ingestion worker configuration
    pub processing: ProcessingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Which embedding model backs the embedder
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama `/api/embeddings`
    #[default]
    Ollama,
    /// Offline feature-hashing embedder
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model backend
    pub backend: EmbeddingBackend,
    /// Model name
    pub model: String,
    /// Embedding dimensions (384 for MiniLM)
    pub dimensions: usize,
    /// Maximum texts sent to the model per call
    pub batch_size: usize,
    /// Cached embeddings kept in memory (0 disables the cache)
    pub cache_capacity: usize,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_delay_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            model: "all-minilm".to_string(),
            dimensions: 384,
            batch_size: 32,
            cache_capacity: 10_000,
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 1,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Check `0 <= chunk_overlap < chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid_config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages returned per query
    pub num_results: usize,
    /// Minimum cosine similarity for a passage to be kept
    pub similarity_threshold: f32,
    /// Multiplier applied to `num_results` for the raw index search
    pub over_fetch_factor: usize,
    /// Largest `top_k` a query may ask for
    pub max_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_results: 5,
            similarity_threshold: 0.7,
            over_fetch_factor: 3,
            max_top_k: 100,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens generated per answer
    pub max_tokens: u32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Generation deadline in seconds
    pub timeout_secs: u64,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_delay_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "llama3:8b-instruct-q4_0".to_string(),
            temperature: 0.1, // Factual answers
            max_tokens: 2048,
            top_p: 0.95,
            top_k: 40,
            timeout_secs: 120,
            max_retries: 3,
            retry_delay_secs: 1,
        }
    }
}

/// Vector index persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Directory holding `index.json` and `documents.json`
    pub storage_path: PathBuf,
    /// Save the index after ingestion and deletion
    pub persist: bool,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        let storage_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("compliance-rag")
            .join("vector_store");

        Self {
            storage_path,
            persist: true,
        }
    }
}

/// Ingestion worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Documents processed concurrently (default: CPU count)
    pub parallel_documents: Option<usize>,
    /// Time budget for a single document in seconds
    pub document_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_documents: None,
            document_timeout_secs: 300, // 5 minutes
        }
    }
}

impl ProcessingConfig {
    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.parallel_documents.unwrap_or_else(num_cpus::get).max(1)
    }
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            Error::invalid_config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Defaults or `COMPLIANCE_RAG_CONFIG`, then environment overrides, then validation
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from process environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (environment, test fixtures)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "CHUNK_SIZE")? {
            self.chunking.chunk_size = v;
        }
        if let Some(v) = parse_var(&lookup, "CHUNK_OVERLAP")? {
            self.chunking.chunk_overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "NUM_RESULTS")? {
            self.retrieval.num_results = v;
        }
        if let Some(v) = parse_var(&lookup, "SIMILARITY_THRESHOLD")? {
            self.retrieval.similarity_threshold = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "MAX_RETRIES")? {
            self.embeddings.max_retries = v;
            self.llm.max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "RETRY_DELAY_SECONDS")? {
            self.embeddings.retry_delay_secs = v;
            self.llm.retry_delay_secs = v;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL").filter(|v| !v.trim().is_empty()) {
            self.embeddings.model = v;
        }
        if let Some(v) = lookup("VECTOR_STORE_PATH").filter(|v| !v.trim().is_empty()) {
            self.vector_db.storage_path = PathBuf::from(v);
        }
        if let Some(v) = parse_var(&lookup, "TEMPERATURE")? {
            self.llm.temperature = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_TOKENS")? {
            self.llm.max_tokens = v;
        }
        if let Some(v) = parse_var(&lookup, "TOP_P")? {
            self.llm.top_p = v;
        }
        if let Some(v) = parse_var(&lookup, "TOP_K")? {
            self.llm.top_k = v;
        }
        Ok(())
    }

    /// Reject configurations the core cannot run with
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.num_results == 0 {
            return Err(Error::invalid_config("num_results must be greater than 0"));
        }
        let threshold = self.retrieval.similarity_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_config(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.retrieval.over_fetch_factor == 0 {
            return Err(Error::invalid_config("over_fetch_factor must be at least 1"));
        }
        if self.retrieval.num_results > self.retrieval.max_top_k {
            return Err(Error::invalid_config(format!(
                "num_results ({}) exceeds max_top_k ({})",
                self.retrieval.num_results, self.retrieval.max_top_k
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::invalid_config("embedding dimensions must be greater than 0"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::invalid_config("embedding batch_size must be greater than 0"));
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            return Err(Error::invalid_config("temperature must be a non-negative number"));
        }
        if !(self.llm.top_p > 0.0 && self.llm.top_p <= 1.0) {
            return Err(Error::invalid_config("top_p must be within (0, 1]"));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::invalid_config("max_tokens must be greater than 0"));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::invalid_config(format!("{}='{}': {}", key, raw, e))),
        _ => Ok(None),
    }
}
