//! Hierarchical tree construction: cluster leaves, summarize, mint
//! parent nodes, repeat until a small enough top layer remains.
//!
//! Grounded on the RAPTOR reference's `build_from_chunks` bottom-up
//! loop (cluster current layer → mint parents with centroid embeddings
//! → recurse on the new layer), adapted to clusters that summarize
//! text via an LLM instead of averaging embeddings alone, and to
//! persist each layer through the [`VectorStore`] instead of an
//! in-memory node map.

use anyhow::{Context, Result};
use std::sync::Arc;

use ragforge_core::kmeans::{Clusterable, KMeansClusterer};
use ragforge_core::models::{Chunk, NodeType};
use ragforge_core::store::{list_all, FilterExpr, VectorStore};

use crate::config::Config;
use crate::llm::LLMProvider;
use crate::summarizer::summarize;

/// Builds (or rebuilds) the tree for `document_id`. A document with
/// five or fewer leaves never grows an intermediate layer: its leaves
/// stay leaves, and path-finding naturally degrades to leaf-only
/// search for it (see [`crate::pathfinder`]).
pub async fn build_tree(config: &Config, llm: Arc<dyn LLMProvider>, store: Arc<dyn VectorStore>, document_id: &str) -> Result<()> {
    let collection = &config.vectorstore.collection;
    let dim = config.vectorstore.dim;
    let tree = &config.tree;

    let leaf_filter = FilterExpr::LevelEq(0).and(FilterExpr::DocumentIdEq(document_id.to_string()));
    let mut current_layer = list_all(store.as_ref(), collection, dim, &leaf_filter, 10_000)
        .await
        .context("failed to load leaves for tree building")?;

    let mut level = 0u32;
    let mut grew_a_layer = false;
    let mut seq = 0u64;

    while current_layer.len() > 5 && level < tree.max_level {
        let clusterer = KMeansClusterer {
            max_iterations: tree.max_iterations,
            convergence_threshold: tree.convergence_threshold,
        };
        let clusters = clusterer.cluster(&current_layer, tree.num_clusters);

        let mut next_layer = Vec::with_capacity(clusters.len());
        for cluster_indices in clusters {
            let children: Vec<&Chunk> = cluster_indices.iter().map(|&i| &current_layer[i]).collect();
            match summarize_cluster(llm.as_ref(), document_id, level, &mut seq, &children).await {
                Ok(parent) => {
                    if let Err(err) = persist_layer_update(store.as_ref(), collection, &children, &parent).await {
                        tracing::warn!(level, error = %err, "failed to persist cluster, skipping");
                        continue;
                    }
                    next_layer.push(parent);
                }
                Err(err) => {
                    tracing::warn!(level, error = %err, "failed to summarize cluster, skipping");
                }
            }
        }

        if next_layer.is_empty() {
            break;
        }
        current_layer = next_layer;
        level += 1;
        grew_a_layer = true;
    }

    if grew_a_layer {
        mark_as_roots(store.as_ref(), collection, &mut current_layer).await?;
    }

    Ok(())
}

async fn summarize_cluster(
    llm: &dyn LLMProvider,
    document_id: &str,
    child_level: u32,
    seq: &mut u64,
    children: &[&Chunk],
) -> Result<Chunk> {
    let contents: Vec<String> = children.iter().map(|c| c.content.clone()).collect();
    let summary = summarize(llm, &contents).await;
    let embedding = llm.embed_single(&summary).await.context("failed to embed cluster summary")?;

    let parent_level = child_level + 1;
    let parent_id = format!("{document_id}_L{parent_level}_{seq}");
    *seq += 1;

    Ok(Chunk {
        id: parent_id,
        document_id: document_id.to_string(),
        document_name: children[0].document_name.clone(),
        section: children[0].section.clone(),
        content: summary,
        embedding,
        level: parent_level,
        parent_id: String::new(),
        node_type: NodeType::Intermediate,
    })
}

async fn persist_layer_update(store: &dyn VectorStore, collection: &str, children: &[&Chunk], parent: &Chunk) -> Result<()> {
    store.insert(collection, std::slice::from_ref(parent)).await?;

    let updated_children: Vec<Chunk> = children
        .iter()
        .map(|child| {
            let mut updated = (*child).clone();
            updated.parent_id = parent.id.clone();
            updated
        })
        .collect();
    store.insert(collection, &updated_children).await?;
    Ok(())
}

async fn mark_as_roots(store: &dyn VectorStore, collection: &str, top_layer: &mut [Chunk]) -> Result<()> {
    for node in top_layer.iter_mut() {
        node.node_type = NodeType::Root;
        node.parent_id = String::new();
    }
    store.insert(collection, top_layer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_implements_clusterable_via_embedding() {
        let chunk = Chunk {
            id: "a".into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "hi".into(),
            embedding: vec![1.0, 0.0],
            level: 0,
            parent_id: String::new(),
            node_type: NodeType::Leaf,
        };
        assert_eq!(Clusterable::embedding(&chunk), &[1.0, 0.0]);
    }
}
