//! In-memory [`VectorStore`] reference implementation.
//!
//! Used by the integration tests and by `ragforge query` when no
//! `vectorstore.endpoint` is configured. Search is brute-force cosine
//! similarity, correct but not meant for large collections.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use ragforge_core::embedding::cosine_similarity;
use ragforge_core::models::Chunk;
use ragforge_core::store::{CollectionStats, FilterExpr, StoreHit, VectorStore};

#[derive(Default)]
struct Collection {
    dim: usize,
    chunks: HashMap<String, Chunk>,
}

pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        MemoryVectorStore {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(&self, name: &str, dim: usize) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        collections.entry(name.to_string()).or_insert_with(|| Collection {
            dim,
            chunks: HashMap::new(),
        });
        Ok(())
    }

    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<Vec<String>> {
        let mut collections = self.collections.write().unwrap();
        let coll = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection {
                dim: chunks.first().map(|c| c.embedding.len()).unwrap_or(0),
                chunks: HashMap::new(),
            });
        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(chunk.id.clone());
            coll.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(ids)
    }

    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<StoreHit>> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(rank(coll.chunks.values(), embedding, top_k))
    }

    async fn search_with_filter(
        &self,
        collection: &str,
        embedding: &[f32],
        filter: &FilterExpr,
        top_k: usize,
    ) -> Result<Vec<StoreHit>> {
        let collections = self.collections.read().unwrap();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = coll.chunks.values().filter(|c| filter.matches(c));
        Ok(rank(matching, embedding, top_k))
    }

    async fn get_stats(&self, collection: &str) -> Result<CollectionStats> {
        let collections = self.collections.read().unwrap();
        let row_count = collections.get(collection).map(|c| c.chunks.len()).unwrap_or(0) as u64;
        Ok(CollectionStats { row_count })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn rank<'a>(chunks: impl Iterator<Item = &'a Chunk>, embedding: &[f32], top_k: usize) -> Vec<StoreHit> {
    let mut hits: Vec<StoreHit> = chunks
        .map(|c| StoreHit {
            chunk: c.clone(),
            score: cosine_similarity(embedding, &c.embedding) as f64,
        })
        .collect();
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_k);
    hits
}
