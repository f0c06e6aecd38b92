//! Top-down greedy tree traversal: pick the most relevant roots, then
//! descend level by level through the most relevant children.
//!
//! Grounded on the RAPTOR reference's `search_traversal` beam search
//! (start at roots, expand children of the surviving beam, repeat
//! until leaves), narrowed from a beam to the greedy top-K-per-level
//! walk the query pipeline expects.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ragforge_core::embedding::cosine_similarity;
use ragforge_core::models::{Chunk, NodeType};
use ragforge_core::store::{list_all, FilterExpr, VectorStore};

use crate::config::Config;

const MAX_ROOTS: usize = 100;
const MAX_CHILDREN_PER_NODE: usize = 1000;

/// Finds a path from the most relevant roots down to their most
/// relevant descendants, deduplicated across all paths.
pub async fn find_path(config: &Config, store: Arc<dyn VectorStore>, query_embedding: &[f32], document_id: Option<&str>) -> Result<Vec<Chunk>> {
    let collection = &config.vectorstore.collection;
    let dim = config.vectorstore.dim;
    let top_k = config.tree.top_k_path;

    let mut root_filter = FilterExpr::NodeTypeEq(NodeType::Root);
    if let Some(doc_id) = document_id {
        root_filter = root_filter.and(FilterExpr::DocumentIdEq(doc_id.to_string()));
    }
    let roots = list_all(store.as_ref(), collection, dim, &root_filter, MAX_ROOTS)
        .await
        .context("failed to list root nodes")?;

    let selected_roots = select_top_k(roots, query_embedding, top_k);

    let mut seen = HashSet::new();
    let mut path = Vec::new();
    for root in selected_roots {
        descend(store.as_ref(), collection, query_embedding, top_k, root, &mut seen, &mut path).await?;
    }
    Ok(path)
}

fn descend<'a>(
    store: &'a dyn VectorStore,
    collection: &'a str,
    query_embedding: &'a [f32],
    top_k: usize,
    node: Chunk,
    seen: &'a mut HashSet<String>,
    path: &'a mut Vec<Chunk>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if seen.insert(node.id.clone()) {
            let level = node.level;
            let node_id = node.id.clone();
            path.push(node);

            if level == 0 {
                return Ok(());
            }

            let child_filter = FilterExpr::ParentIdEq(node_id);
            let dim = query_embedding.len();
            let children = list_all(store, collection, dim, &child_filter, MAX_CHILDREN_PER_NODE).await?;
            if children.is_empty() {
                return Ok(());
            }

            let selected = select_top_k(children, query_embedding, top_k);
            for child in selected {
                descend(store, collection, query_embedding, top_k, child, seen, path).await?;
            }
        }
        Ok(())
    })
}

/// Ranks `nodes` by cosine similarity to `query_embedding` and keeps
/// the top `k`. A node with no stored embedding is kept with
/// similarity 0 rather than dropped, per §4.6.
fn select_top_k(nodes: Vec<Chunk>, query_embedding: &[f32], k: usize) -> Vec<Chunk> {
    let mut scored: Vec<(f32, Chunk)> = nodes
        .into_iter()
        .map(|n| {
            let score = if n.embedding.is_empty() { 0.0 } else { cosine_similarity(query_embedding, &n.embedding) };
            (score, n)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored.into_iter().map(|(_, n)| n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, level: u32, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "c".into(),
            embedding,
            level,
            parent_id: String::new(),
            node_type: NodeType::Root,
        }
    }

    #[test]
    fn select_top_k_prefers_closer_embeddings() {
        let nodes = vec![chunk("far", 1, vec![0.0, 1.0]), chunk("near", 1, vec![1.0, 0.0])];
        let out = select_top_k(nodes, &[1.0, 0.0], 1);
        assert_eq!(out[0].id, "near");
    }

    #[test]
    fn select_top_k_treats_missing_embedding_as_zero_similarity() {
        let nodes = vec![chunk("no_embedding", 1, vec![]), chunk("has_embedding", 1, vec![1.0, 0.0])];
        let out = select_top_k(nodes, &[1.0, 0.0], 2);
        assert_eq!(out[0].id, "has_embedding");
        assert_eq!(out[1].id, "no_embedding");
    }
}
