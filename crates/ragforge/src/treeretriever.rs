//! Three-phase hybrid tree retrieval: path-find from roots, search
//! leaves globally, fuse by level-weighted score.
//!
//! Grounded on the RAPTOR reference's `search_hybrid` (collapsed
//! candidates plus subtree traversal, deduplicated and merged by
//! score) and on the level-weighted fusion idea from the corpus's
//! hierarchical search example.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use ragforge_core::embedding::cosine_similarity;
use ragforge_core::models::{Chunk, NodeType, SearchResult};
use ragforge_core::store::{FilterExpr, VectorStore};

use crate::config::Config;
use crate::pathfinder::find_path;

const SIM_WEIGHT: f64 = 0.7;
const LEVEL_WEIGHT: f64 = 0.3;

fn level_weight(level: u32) -> f64 {
    (0.3 + 0.3 * level as f64).min(1.0)
}

/// Runs the 3-phase hybrid retrieval. Returns an empty list (rather
/// than an error) when both phases come up empty, so callers can fall
/// back to flat retrieval per §4.7's degradation rule.
pub async fn retrieve(
    config: &Config,
    store: Arc<dyn VectorStore>,
    query_embedding: &[f32],
    document_id: Option<&str>,
) -> Result<Vec<SearchResult>> {
    let path = find_path(config, store.clone(), query_embedding, document_id).await.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "path-finding failed, continuing with leaf search only");
        Vec::new()
    });
    let path_ids: HashSet<String> = path.iter().map(|n| n.id.clone()).collect();

    let mut leaf_filter = FilterExpr::LevelEq(0);
    if let Some(doc_id) = document_id {
        leaf_filter = leaf_filter.and(FilterExpr::DocumentIdEq(doc_id.to_string()));
    }
    let leaf_hits = store
        .search_with_filter(&config.vectorstore.collection, query_embedding, &leaf_filter, config.tree.top_k_leaf)
        .await;

    let leaves = match leaf_hits {
        Ok(hits) => hits.into_iter().map(|h| h.chunk).filter(|c| !path_ids.contains(&c.id)).collect::<Vec<_>>(),
        Err(err) => {
            if path.is_empty() {
                tracing::warn!(error = %err, "leaf search failed with no path nodes, returning empty result");
                return Ok(Vec::new());
            }
            tracing::warn!(error = %err, "leaf search failed, continuing with path nodes only");
            Vec::new()
        }
    };

    let mut merged: Vec<Chunk> = path;
    merged.extend(leaves);

    let mut scored: Vec<SearchResult> = merged
        .into_iter()
        .map(|chunk| {
            let sim = if chunk.embedding.is_empty() { 0.0 } else { cosine_similarity(query_embedding, &chunk.embedding) as f64 };
            let score = sim * SIM_WEIGHT + level_weight(chunk.level) * LEVEL_WEIGHT;
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("tree_level".to_string(), serde_json::json!(chunk.level));
            metadata.insert("node_type".to_string(), serde_json::json!(matches!(chunk.node_type, NodeType::Leaf)));
            SearchResult {
                id: chunk.id,
                document_id: chunk.document_id,
                document_name: chunk.document_name,
                section: chunk.section,
                content: chunk.content,
                score,
                metadata: Some(metadata),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_weight_caps_at_one() {
        assert_eq!(level_weight(0), 0.3);
        assert!((level_weight(3) - 1.0).abs() < 1e-9);
        assert!((level_weight(10) - 1.0).abs() < 1e-9);
    }
}
