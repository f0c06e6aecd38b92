//! Flat (non-tree) retrieval: a single nearest-neighbor search over a
//! collection, with no path-finding or level weighting.
//!
//! Grounded on the teacher's semantic search mode in `search.rs`
//! (`fetch_vector_candidates`): embed the query, score by cosine
//! similarity, truncate to the configured top-K. Used for collections
//! that were never tree-built (small documents, or when the caller
//! asks for flat mode explicitly).

use anyhow::Result;
use std::sync::Arc;

use ragforge_core::models::SearchResult;
use ragforge_core::store::{FilterExpr, VectorStore};

use crate::config::Config;

/// Runs a plain top-K vector search, optionally scoped to one document.
pub async fn retrieve(
    config: &Config,
    store: Arc<dyn VectorStore>,
    query_embedding: &[f32],
    document_id: Option<&str>,
) -> Result<Vec<SearchResult>> {
    let collection = &config.vectorstore.collection;
    let top_k = config.retrieval.top_k;

    let hits = match document_id {
        Some(doc_id) => {
            let filter = FilterExpr::DocumentIdEq(doc_id.to_string());
            store.search_with_filter(collection, query_embedding, &filter, top_k).await?
        }
        None => store.search(collection, query_embedding, top_k).await?,
    };

    Ok(hits
        .into_iter()
        .map(|hit| SearchResult {
            id: hit.chunk.id,
            document_id: hit.chunk.document_id,
            document_name: hit.chunk.document_name,
            section: hit.chunk.section,
            content: hit.chunk.content,
            score: hit.score,
            metadata: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::memory::MemoryVectorStore;
    use ragforge_core::models::{Chunk, NodeType};

    fn chunk(id: &str, document_id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.into(),
            document_id: document_id.into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "hello".into(),
            embedding,
            level: 0,
            parent_id: String::new(),
            node_type: NodeType::Leaf,
        }
    }

    fn test_config() -> Config {
        let toml = r#"
            [server]
            bind = "127.0.0.1:8080"
            [vectorstore]
            collection = "docs"
            dim = 2
            [retrieval]
            top_k = 5
        "#;
        toml::from_str(toml).unwrap()
    }

    #[tokio::test]
    async fn retrieve_returns_nearest_first() {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        store.create_collection("docs", 2).await.unwrap();
        store
            .insert(
                "docs",
                &[chunk("near", "d1", vec![1.0, 0.0]), chunk("far", "d1", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let mut config = test_config();
        config.vectorstore.collection = "docs".to_string();
        let results = retrieve(&config, store, &[1.0, 0.0], None).await.unwrap();
        assert_eq!(results[0].id, "near");
    }

    #[tokio::test]
    async fn retrieve_scopes_to_document_when_given() {
        let store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        store.create_collection("docs", 2).await.unwrap();
        store
            .insert(
                "docs",
                &[chunk("a", "d1", vec![1.0, 0.0]), chunk("b", "d2", vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        let mut config = test_config();
        config.vectorstore.collection = "docs".to_string();
        let results = retrieve(&config, store, &[1.0, 0.0], Some("d2")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }
}
