//! The `RagService` orchestrator: wires config, vector store, LLM
//! provider, cache, metrics, and the worker pool into the query and
//! indexing pipelines described by the system overview's data flow.
//!
//! Grounded on the teacher's top-level "app context" pattern (a struct
//! holding the pool/config/registries that every handler borrows from),
//! generalized from a single sqlx pool to the RAG service's several
//! pluggable collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragforge_core::models::{ChunkSource, EvaluationInput, EvaluationResult, QueryResult};
use ragforge_core::store::VectorStore;

use crate::cache::{cache_key, DisabledCache, QueryCache, RedisCache};
use crate::config::Config;
use crate::enhancer::{self, EnhancerOptions};
use crate::error::RagError;
use crate::evaluator;
use crate::generator;
use crate::indexer::{self, IndexReport};
use crate::llm::registry::LlmRegistry;
use crate::llm::{LLMProvider, LlmError};
use crate::metrics::Metrics;
use crate::retriever;
use crate::treebuilder;
use crate::treeretriever;
use crate::vectorstore::{http::HttpVectorStore, memory::MemoryVectorStore};
use crate::worker::WorkerPool;

pub struct RagService {
    config: Config,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LLMProvider>,
    cache: Arc<dyn QueryCache>,
    metrics: Arc<Metrics>,
    workers: Arc<WorkerPool>,
}

impl RagService {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn VectorStore> = match &config.vectorstore.endpoint {
            Some(url) => Arc::new(HttpVectorStore::new(url.clone())?),
            None => Arc::new(MemoryVectorStore::new()),
        };

        let registry = LlmRegistry::with_builtins();
        let llm = registry.create(&config.llm, config.resilience.clone())?;

        let cache: Arc<dyn QueryCache> = if config.cache.enabled {
            let redis_url = config
                .cache
                .resolved_redis_url()
                .ok_or_else(|| anyhow::anyhow!("cache.enabled requires a resolvable redis URL"))?;
            Arc::new(RedisCache::new(&redis_url, config.cache.prefix.clone(), config.cache.ttl_secs)?)
        } else {
            Arc::new(DisabledCache)
        };

        let metrics = Arc::new(Metrics::new()?);
        let workers = Arc::new(WorkerPool::new(config.worker.pool_size, config.worker.queue_size));

        Ok(RagService { config, store, llm, cache, metrics, workers })
    }

    /// Indexes a URL (direct file or ZIP archive) into `data_dir`, then
    /// schedules tree building for every document produced.
    pub async fn index_url(&self, url: &str, data_dir: &Path) -> anyhow::Result<IndexReport> {
        let report = indexer::index_from_url(&self.config, self.llm.clone(), self.store.clone(), url, data_dir).await?;
        self.schedule_tree_builds(&report.document_ids);
        self.metrics.documents_indexed_total.inc_by(report.files_indexed as u64);
        self.metrics.chunks_indexed_total.inc_by(report.chunks_written as u64);
        Ok(report)
    }

    /// Indexes an already-on-disk directory, then schedules tree
    /// building for every document produced.
    pub async fn index_directory(&self, dir: &Path) -> anyhow::Result<IndexReport> {
        let report = indexer::index_directory(&self.config, self.llm.clone(), self.store.clone(), dir).await?;
        self.schedule_tree_builds(&report.document_ids);
        self.metrics.documents_indexed_total.inc_by(report.files_indexed as u64);
        self.metrics.chunks_indexed_total.inc_by(report.chunks_written as u64);
        Ok(report)
    }

    fn schedule_tree_builds(&self, document_ids: &[String]) {
        for document_id in document_ids {
            let config = self.config.clone();
            let llm = self.llm.clone();
            let store = self.store.clone();
            let document_id = document_id.clone();
            let delay = Duration::from_secs(self.config.worker.tree_build_delay_secs);
            self.workers.submit(Box::pin(async move {
                tokio::time::sleep(delay).await;
                if let Err(err) = treebuilder::build_tree(&config, llm, store, &document_id).await {
                    tracing::error!(document_id, error = %err, "tree building failed");
                }
            }));
        }
    }

    /// Runs the full query pipeline: cache → enhance → retrieve (tree,
    /// falling back to flat) → rerank → repack → generate → cache-write.
    pub async fn query(&self, question: &str, document_id: Option<&str>, options: EnhancerOptions) -> Result<QueryResult, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::BadRequest("question must not be empty".to_string()));
        }

        self.metrics.queries_total.inc();

        match self.cache.get(question).await {
            Ok(Some(cached)) => {
                self.metrics.record_cache_hit();
                return Ok(cached);
            }
            Ok(None) => self.metrics.record_cache_miss(),
            Err(_) => self.metrics.record_cache_miss(),
        }

        let query_text = if options.rewrite {
            enhancer::rewrite_query(self.llm.as_ref(), question).await
        } else {
            question.to_string()
        };

        let embeddings = if options.hyde {
            enhancer::hyde_embeddings(self.llm.as_ref(), &query_text).await
        } else {
            let started = Instant::now();
            let outcome = self.llm.embed_single(&query_text).await;
            self.metrics.record_llm_call("embed", started.elapsed());
            self.metrics.record_breaker_state(self.llm.breaker_state());
            match outcome {
                Ok(v) => vec![v],
                Err(LlmError::CircuitOpen(msg)) => {
                    self.metrics.errors_total.inc();
                    return Err(RagError::CircuitOpen(msg));
                }
                Err(err) => {
                    self.metrics.errors_total.inc();
                    return Err(RagError::Internal(format!("failed to embed query: {err}")));
                }
            }
        };

        if embeddings.is_empty() {
            self.metrics.errors_total.inc();
            return Err(RagError::Internal("failed to produce any query embedding".to_string()));
        }

        let retrieval_started = Instant::now();
        let mut result_lists = Vec::with_capacity(embeddings.len());
        for embedding in &embeddings {
            result_lists.push(self.retrieve_one(embedding, document_id).await);
        }
        self.metrics.retrieval_total.inc();
        self.metrics.record_retrieval_duration(retrieval_started.elapsed());

        let merged = enhancer::merge_result_lists(result_lists);
        let finalized = enhancer::enhance_and_finalize(self.llm.clone(), &query_text, options, merged).await;

        let generate_started = Instant::now();
        let (result, usage) = generator::generate(&self.config, self.llm.as_ref(), question, &finalized).await;
        self.metrics.record_llm_call("generate", generate_started.elapsed());
        self.metrics.record_breaker_state(self.llm.breaker_state());
        if let Some(usage) = &usage {
            self.metrics.record_token_usage(usage);
        }

        if let Err(err) = self.cache.set(question, &result).await {
            tracing::warn!(error = %err, "failed to write query cache");
        }

        Ok(result)
    }

    async fn retrieve_one(&self, embedding: &[f32], document_id: Option<&str>) -> Vec<ragforge_core::models::SearchResult> {
        match treeretriever::retrieve(&self.config, self.store.clone(), embedding, document_id).await {
            Ok(hits) if !hits.is_empty() => hits,
            Ok(_) => self.flat_retrieve(embedding, document_id).await,
            Err(err) => {
                tracing::warn!(error = %err, "tree retrieval failed, falling back to flat retrieval");
                self.flat_retrieve(embedding, document_id).await
            }
        }
    }

    async fn flat_retrieve(&self, embedding: &[f32], document_id: Option<&str>) -> Vec<ragforge_core::models::SearchResult> {
        retriever::retrieve(&self.config, self.store.clone(), embedding, document_id)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "flat retrieval failed");
                Vec::new()
            })
    }

    pub async fn evaluate(&self, input: &EvaluationInput) -> EvaluationResult {
        evaluator::evaluate(self.llm.as_ref(), &self.config.evaluator, input).await
    }

    /// Runs a query, then evaluates the resulting answer against its
    /// own retrieved sources (and `ground_truth` when supplied).
    pub async fn query_and_evaluate(
        &self,
        question: &str,
        ground_truth: Option<String>,
    ) -> Result<(QueryResult, EvaluationResult), RagError> {
        let result = self.query(question, None, EnhancerOptions::default()).await?;
        let contexts: Vec<String> = result.sources.iter().map(|s: &ChunkSource| s.content.clone()).collect();
        let input = EvaluationInput {
            question: question.to_string(),
            answer: result.answer.clone(),
            contexts,
            ground_truth,
        };
        let evaluation = self.evaluate(&input).await;
        Ok((result, evaluation))
    }

    pub async fn stats(&self) -> anyhow::Result<ServiceStats> {
        let store_stats = self.store.get_stats(&self.config.vectorstore.collection).await?;
        Ok(ServiceStats {
            collection: self.config.vectorstore.collection.clone(),
            chunk_count: store_stats.row_count,
            llm_provider: self.llm.name().to_string(),
            cache_hit_rate: self.metrics.cache_hit_rate(),
            uptime_seconds: self.metrics.uptime_seconds(),
        })
    }

    pub fn metrics_text(&self) -> anyhow::Result<String> {
        self.metrics.export()
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.metrics.uptime_seconds()
    }

    pub fn cache_key_for(&self, question: &str) -> String {
        cache_key(&self.config.cache.prefix, question)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ServiceStats {
    pub collection: String,
    pub chunk_count: u64,
    pub llm_provider: String,
    pub cache_hit_rate: f64,
    pub uptime_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 2
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"
            embedding_model = "text-embedding-3-small"
        "#;
        toml::from_str(toml).unwrap()
    }

    #[tokio::test]
    async fn new_builds_an_in_memory_store_without_an_endpoint() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let config = test_config();
        let service = RagService::new(config);
        assert!(service.is_ok());
    }

    #[tokio::test]
    async fn query_surfaces_circuit_open_once_the_breaker_trips() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/v1/embeddings").with_status(500).create_async().await;

        let toml = format!(
            r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 2
            [llm]
            provider = "openai"
            model = "gpt-4o-mini"
            embedding_model = "text-embedding-3-small"
            base_url = "{}"
            [resilience]
            max_attempts = 1
            initial_delay_ms = 1
            max_delay_ms = 1
            breaker_max_failures = 1
            breaker_timeout_secs = 60
            "#,
            server.url()
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let service = RagService::new(config).unwrap();

        let first = service.query("what is rust?", None, EnhancerOptions::default()).await;
        assert!(first.is_err());

        let second = service.query("what is rust?", None, EnhancerOptions::default()).await;
        assert!(matches!(second, Err(RagError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn query_rejects_empty_question() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let service = RagService::new(test_config()).unwrap();
        let err = service.query("   ", None, EnhancerOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::BadRequest(_)));
    }
}
