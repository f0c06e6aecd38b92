//! Axum HTTP surface.
//!
//! Grounded directly on the teacher's `server.rs`: an `AppState` struct
//! shared via Axum's `State` extractor, a permissive CORS layer for
//! browser/cross-origin MCP-style clients, and handlers that convert
//! domain results into the `{ "error": { "code", "message" } }` shape —
//! here delegated to [`crate::error::RagError`]'s `IntoResponse` impl
//! instead of a second, parallel `AppError` type.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use ragforge_core::models::{EvaluationInput, EvaluationResult, QueryResult};

use crate::enhancer::EnhancerOptions;
use crate::error::RagError;
use crate::service::RagService;

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
    query_timeout: Duration,
}

pub async fn run_server(service: RagService, bind: &str, query_timeout_secs: u64) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(service),
        query_timeout: Duration::from_secs(query_timeout_secs),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/v1/rag/index", post(handle_index_url))
        .route("/v1/rag/index/url", post(handle_index_url))
        .route("/v1/rag/index/directory", post(handle_index_directory))
        .route("/v1/rag/query", post(handle_query))
        .route("/v1/rag/stats", get(handle_stats))
        .route("/v1/rag/collections", get(handle_collections))
        .route("/v1/rag/evaluate", post(handle_evaluate))
        .route("/v1/rag/query-evaluate", post(handle_query_evaluate))
        .route("/v1/rag/metrics", get(handle_metrics))
        .route("/v1/rag/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind, "ragforge server listening");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
struct IndexUrlRequest {
    #[serde(alias = "source_url")]
    url: String,
}

#[derive(Serialize)]
struct IndexResponse {
    files_indexed: usize,
    files_failed: usize,
    chunks_written: usize,
}

async fn handle_index_url(State(state): State<AppState>, Json(req): Json<IndexUrlRequest>) -> Result<Json<IndexResponse>, RagError> {
    if req.url.trim().is_empty() {
        return Err(RagError::BadRequest("url must not be empty".to_string()));
    }
    let data_dir = std::env::temp_dir().join("ragforge-index");
    let report = state
        .service
        .index_url(&req.url, &data_dir)
        .await
        .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(Json(IndexResponse {
        files_indexed: report.files_indexed,
        files_failed: report.files_failed,
        chunks_written: report.chunks_written,
    }))
}

#[derive(Deserialize)]
struct IndexDirectoryRequest {
    directory: String,
}

async fn handle_index_directory(
    State(state): State<AppState>,
    Json(req): Json<IndexDirectoryRequest>,
) -> Result<Json<IndexResponse>, RagError> {
    if req.directory.trim().is_empty() {
        return Err(RagError::BadRequest("directory must not be empty".to_string()));
    }
    let report = state
        .service
        .index_directory(std::path::Path::new(&req.directory))
        .await
        .map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(Json(IndexResponse {
        files_indexed: report.files_indexed,
        files_failed: report.files_failed,
        chunks_written: report.chunks_written,
    }))
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    rewrite: bool,
    #[serde(default)]
    hyde: bool,
    #[serde(default)]
    rerank: bool,
}

async fn handle_query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Result<Json<QueryResult>, RagError> {
    let options = EnhancerOptions {
        rewrite: req.rewrite,
        hyde: req.hyde,
        rerank: req.rerank,
        ..EnhancerOptions::default()
    };

    let query = state.service.query(&req.question, req.document_id.as_deref(), options);
    match tokio::time::timeout(state.query_timeout, query).await {
        Ok(result) => result.map(Json),
        Err(_) => Err(RagError::Timeout(format!("query exceeded {:?}", state.query_timeout))),
    }
}

#[derive(Serialize)]
struct StatsResponse {
    collection: String,
    chunk_count: u64,
    llm_provider: String,
    cache_hit_rate: f64,
    uptime_seconds: f64,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, RagError> {
    let stats = state.service.stats().await.map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(Json(StatsResponse {
        collection: stats.collection,
        chunk_count: stats.chunk_count,
        llm_provider: stats.llm_provider,
        cache_hit_rate: stats.cache_hit_rate,
        uptime_seconds: stats.uptime_seconds,
    }))
}

#[derive(Serialize)]
struct CollectionsResponse {
    collections: Vec<StatsResponse>,
}

async fn handle_collections(State(state): State<AppState>) -> Result<Json<CollectionsResponse>, RagError> {
    let stats = state.service.stats().await.map_err(|e| RagError::Internal(e.to_string()))?;
    Ok(Json(CollectionsResponse {
        collections: vec![StatsResponse {
            collection: stats.collection,
            chunk_count: stats.chunk_count,
            llm_provider: stats.llm_provider,
            cache_hit_rate: stats.cache_hit_rate,
            uptime_seconds: stats.uptime_seconds,
        }],
    }))
}

async fn handle_evaluate(State(state): State<AppState>, Json(req): Json<EvaluationInput>) -> Json<EvaluationResult> {
    Json(state.service.evaluate(&req).await)
}

#[derive(Deserialize)]
struct QueryEvaluateRequest {
    question: String,
    #[serde(default)]
    ground_truth: Option<String>,
}

#[derive(Serialize)]
struct QueryEvaluateResponse {
    answer: QueryResult,
    evaluation: EvaluationResult,
}

async fn handle_query_evaluate(
    State(state): State<AppState>,
    Json(req): Json<QueryEvaluateRequest>,
) -> Result<Json<QueryEvaluateResponse>, RagError> {
    let (answer, evaluation) = state
        .service
        .query_and_evaluate(&req.question, req.ground_truth)
        .await?;
    Ok(Json(QueryEvaluateResponse { answer, evaluation }))
}

async fn handle_metrics(State(state): State<AppState>) -> Result<String, RagError> {
    state.service.metrics_text().map_err(|e| RagError::Internal(e.to_string()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: f64,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", uptime_seconds: state.service.uptime_seconds() })
}
