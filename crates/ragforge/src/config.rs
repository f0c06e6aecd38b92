//! Configuration parsing and validation.
//!
//! ragforge is configured via a TOML file (default: `config/rag.toml`).
//! The config defines the HTTP bind address, vector-store and LLM
//! provider settings, chunking/tree/cache/resilience tuning, and
//! evaluator metric weights.
//!
//! Secrets (`OPENAI_API_KEY`, `REDIS_PASSWORD`) fall back to the
//! environment when the corresponding config field is left empty.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub vectorstore: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

fn default_query_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    pub collection: String,
    pub dim: usize,
    /// Base URL of the remote vector store; omit to use the in-memory
    /// reference store (tests and local experimentation only).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    #[serde(default = "default_insert_throttle_secs")]
    pub insert_throttle_secs: u64,
}

fn default_insert_batch_size() -> usize {
    10
}

fn default_insert_throttle_secs() -> u64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            embedding_model: None,
            dims: None,
            base_url: None,
            embed_batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embed_batch_size() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_index_file_extensions")]
    pub file_extensions: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            file_extensions: default_index_file_extensions(),
        }
    }
}

fn default_chunk_size() -> usize {
    700
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_index_file_extensions() -> Vec<String> {
    vec!["md".to_string(), "mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct TreeConfig {
    #[serde(default = "default_num_clusters")]
    pub num_clusters: usize,
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_top_k_path")]
    pub top_k_path: usize,
    #[serde(default = "default_top_k_leaf")]
    pub top_k_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            num_clusters: default_num_clusters(),
            max_level: default_max_level(),
            convergence_threshold: default_convergence_threshold(),
            max_iterations: default_max_iterations(),
            top_k_path: default_top_k_path(),
            top_k_leaf: default_top_k_leaf(),
        }
    }
}

fn default_num_clusters() -> usize {
    5
}
fn default_max_level() -> u32 {
    3
}
fn default_convergence_threshold() -> f32 {
    0.001
}
fn default_max_iterations() -> usize {
    10
}
fn default_top_k_path() -> usize {
    3
}
fn default_top_k_leaf() -> usize {
    10
}

/// Prompt assembly for the answer-generation stage.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_system_prompt_template")]
    pub system_prompt_template: String,
    #[serde(default = "default_no_context_answer")]
    pub no_context_answer: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            system_prompt_template: default_system_prompt_template(),
            no_context_answer: default_no_context_answer(),
        }
    }
}

fn default_system_prompt_template() -> String {
    "You are a helpful assistant. Answer the question using only the context below. \
     If the context does not contain the answer, say so.\n\n\
     Context:\n{{context}}\n\nQuestion: {{question}}"
        .to_string()
}

fn default_no_context_answer() -> String {
    "I don't have any relevant information to answer that question.".to_string()
}

/// Sizing for the background fire-and-forget worker pool (tree
/// building, post-index summarization).
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_worker_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_tree_build_delay_secs")]
    pub tree_build_delay_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_worker_pool_size(),
            queue_size: default_worker_queue_size(),
            tree_build_delay_secs: default_tree_build_delay_secs(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    4
}
fn default_worker_queue_size() -> usize {
    64
}
fn default_tree_build_delay_secs() -> u64 {
    60
}

/// Tuning for the single-stage (non-tree) retrieval path.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: default_retrieval_top_k() }
    }
}

fn default_retrieval_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: default_cache_prefix(),
            ttl_secs: default_cache_ttl_secs(),
            redis_url: None,
        }
    }
}

fn default_cache_prefix() -> String {
    "ragforge:query:".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_breaker_max_failures")]
    pub breaker_max_failures: u32,
    #[serde(default = "default_breaker_timeout_secs")]
    pub breaker_timeout_secs: u64,
    #[serde(default = "default_breaker_half_open_max_calls")]
    pub breaker_half_open_max_calls: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            breaker_max_failures: default_breaker_max_failures(),
            breaker_timeout_secs: default_breaker_timeout_secs(),
            breaker_half_open_max_calls: default_breaker_half_open_max_calls(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_breaker_max_failures() -> u32 {
    5
}
fn default_breaker_timeout_secs() -> u64 {
    30
}
fn default_breaker_half_open_max_calls() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluatorConfig {
    #[serde(default = "default_weight_faithfulness")]
    pub weight_faithfulness: f64,
    #[serde(default = "default_weight_relevancy")]
    pub weight_relevancy: f64,
    #[serde(default = "default_weight_precision")]
    pub weight_precision: f64,
    #[serde(default = "default_weight_recall")]
    pub weight_recall: f64,
    #[serde(default = "default_relevancy_questions")]
    pub relevancy_questions: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weight_faithfulness: default_weight_faithfulness(),
            weight_relevancy: default_weight_relevancy(),
            weight_precision: default_weight_precision(),
            weight_recall: default_weight_recall(),
            relevancy_questions: default_relevancy_questions(),
        }
    }
}

fn default_weight_faithfulness() -> f64 {
    0.3
}
fn default_weight_relevancy() -> f64 {
    0.3
}
fn default_weight_precision() -> f64 {
    0.2
}
fn default_weight_recall() -> f64 {
    0.2
}
fn default_relevancy_questions() -> usize {
    3
}

impl LlmConfig {
    /// Resolve the API key: environment variable always wins, since
    /// keys are never written to the TOML file.
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "LLM_API_KEY",
        }
    }
}

impl CacheConfig {
    pub fn resolved_redis_url(&self) -> Option<String> {
        if let Some(url) = &self.redis_url {
            if !url.is_empty() {
                return Some(url.clone());
            }
        }
        std::env::var("REDIS_URL").ok()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content).with_context(|| "failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.vectorstore.dim == 0 {
        anyhow::bail!("vectorstore.dim must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be less than chunking.chunk_size");
    }
    let w = &config.evaluator;
    let total = w.weight_faithfulness + w.weight_relevancy + w.weight_precision + w.weight_recall;
    if total <= 0.0 {
        anyhow::bail!("evaluator metric weights must sum to a positive value");
    }
    if config.cache.enabled && config.cache.resolved_redis_url().is_none() {
        anyhow::bail!("cache.enabled requires cache.redis_url or the REDIS_URL environment variable");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"

            [vectorstore]
            collection = "docs"
            dim = 1536
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.chunking.chunk_size, 700);
        assert_eq!(config.tree.num_clusters, 5);
        assert_eq!(config.resilience.max_attempts, 3);
    }

    #[test]
    fn validate_rejects_zero_dim() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_overlap_ge_chunk_size() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 8
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn validate_requires_redis_url_when_cache_enabled() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 8
            [cache]
            enabled = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(validate(&config).is_err());
    }
}
