//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines all operations the query and
//! indexing pipelines need from an external vector database, enabling
//! pluggable backends (a remote HTTP-based store in production, an
//! in-memory store for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// A single hit returned from [`VectorStore::search`] or
/// [`VectorStore::search_with_filter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHit {
    pub chunk: Chunk,
    pub score: f64,
}

/// Aggregate statistics for a collection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub row_count: u64,
}

/// A boolean filter expression over chunk metadata fields.
///
/// Supports equality comparisons on known fields (`level`,
/// `node_type`, `document_id`, `parent_id`) combined with `&&`/`||`.
/// This is a tiny structured language rather than a parsed string, so
/// callers build it directly rather than writing query syntax.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    LevelEq(u32),
    NodeTypeEq(crate::models::NodeType),
    DocumentIdEq(String),
    ParentIdEq(String),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn and(self, other: FilterExpr) -> FilterExpr {
        FilterExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpr) -> FilterExpr {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate the expression against a chunk's metadata.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        match self {
            FilterExpr::LevelEq(l) => chunk.level == *l,
            FilterExpr::NodeTypeEq(t) => chunk.node_type == *t,
            FilterExpr::DocumentIdEq(id) => &chunk.document_id == id,
            FilterExpr::ParentIdEq(id) => &chunk.parent_id == id,
            FilterExpr::And(a, b) => a.matches(chunk) && b.matches(chunk),
            FilterExpr::Or(a, b) => a.matches(chunk) || b.matches(chunk),
        }
    }
}

/// Abstract vector store backend.
///
/// All operations are async (via `async-trait`) so both a remote HTTP
/// client and an in-memory reference implementation can satisfy the
/// same contract.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection with the given embedding dimension. Idempotent.
    async fn create_collection(&self, name: &str, dim: usize) -> Result<()>;

    /// Insert chunks (which already carry embeddings) into a collection.
    /// Returns the inserted chunk ids.
    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<Vec<String>>;

    /// Plain top-K nearest-neighbor search.
    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<StoreHit>>;

    /// Top-K nearest-neighbor search restricted to chunks matching `filter`.
    async fn search_with_filter(
        &self,
        collection: &str,
        embedding: &[f32],
        filter: &FilterExpr,
        top_k: usize,
    ) -> Result<Vec<StoreHit>>;

    /// Row count and other aggregate stats for a collection.
    async fn get_stats(&self, collection: &str) -> Result<CollectionStats>;

    /// Release any held resources (connections, handles).
    async fn close(&self) -> Result<()>;
}

/// Convenience helper for callers that need every matching chunk
/// rather than a nearest-neighbor ranking (tree construction, path
/// traversal). Built on [`VectorStore::search_with_filter`] with a
/// zero query vector, since the trait exposes no unranked listing
/// operation of its own.
pub async fn list_all(store: &dyn VectorStore, collection: &str, dim: usize, filter: &FilterExpr, limit: usize) -> Result<Vec<Chunk>> {
    let zero = vec![0.0f32; dim];
    let hits = store.search_with_filter(collection, &zero, filter, limit).await?;
    Ok(hits.into_iter().map(|h| h.chunk).collect())
}
