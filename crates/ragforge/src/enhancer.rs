//! Query enhancement: rewriting, HyDE, reranking, and repacking.
//!
//! Each operation is independently toggleable and degrades to a no-op
//! (or the plain original value) on LLM failure rather than aborting
//! the query, matching the teacher's "inline, non-fatal" embedding
//! pattern in its ingestion path.

use std::sync::Arc;

use ragforge_core::models::SearchResult;
use ragforge_core::rrf::{reciprocal_rank_fusion, repack_high_low_mid};

use crate::llm::LLMProvider;

#[derive(Debug, Clone, Copy)]
pub struct EnhancerOptions {
    pub rewrite: bool,
    pub hyde: bool,
    pub rerank: bool,
    pub repack: bool,
    pub rerank_top_k: usize,
}

impl Default for EnhancerOptions {
    fn default() -> Self {
        EnhancerOptions {
            rewrite: false,
            hyde: false,
            rerank: false,
            repack: true,
            rerank_top_k: 10,
        }
    }
}

const REWRITE_PROMPT: &str = "Rewrite the following search query to be more specific and keyword-rich for a document retrieval system. Return only the rewritten query, nothing else.";
const HYDE_PROMPT: &str = "Write a short, plausible passage that would answer the following question, as if it were an excerpt from a reference document.";
const RERANK_SYSTEM_PROMPT: &str =
    "You judge how relevant a passage is to a query. Respond with only a number between 0 and 1.";

/// Rewrites `query` into an expanded, keyword-enriched form. Falls back
/// to the original query if the LLM call fails.
pub async fn rewrite_query(llm: &dyn LLMProvider, query: &str) -> String {
    match llm.generate(query, REWRITE_PROMPT).await {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
        _ => query.to_string(),
    }
}

/// Generates a hypothetical answer to `query` and embeds it, returning
/// the query's own embedding and the HyDE embedding side by side.
pub async fn hyde_embeddings(llm: &dyn LLMProvider, query: &str) -> Vec<Vec<f32>> {
    let query_embedding = match llm.embed_single(query).await {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut embeddings = vec![query_embedding];

    if let Ok(resp) = llm.generate(query, HYDE_PROMPT).await {
        if let Ok(hyde_embedding) = llm.embed_single(&resp.content).await {
            embeddings.push(hyde_embedding);
        }
    }
    embeddings
}

/// Merges multiple ranked result lists (one per query embedding) via
/// Reciprocal Rank Fusion, returning a single deduplicated, re-scored,
/// descending-sorted list.
pub fn merge_result_lists(lists: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    if lists.len() <= 1 {
        return lists.into_iter().next().unwrap_or_default();
    }
    let fused_scores = reciprocal_rank_fusion(&lists);
    let mut all: Vec<SearchResult> = lists.into_iter().flatten().collect();
    all = ragforge_core::rrf::dedup_by_id(all);
    for result in &mut all {
        if let Some(score) = fused_scores.get(&result.id) {
            result.score = *score;
        }
    }
    all.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    all
}

/// Asks the LLM to score each candidate's relevance to `query` in
/// `[0, 1]`, blends it with the original retrieval score, and keeps the
/// top `top_k`. Parse failures default the LLM score to `0.5`.
pub async fn rerank(llm: &dyn LLMProvider, query: &str, mut candidates: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    for candidate in &mut candidates {
        let prompt = format!("Query: {query}\n\nPassage:\n{}\n\nRelevance score (0 to 1):", candidate.content);
        let llm_score = match llm.generate(&prompt, RERANK_SYSTEM_PROMPT).await {
            Ok(resp) => parse_relevance_score(&resp.content),
            Err(_) => 0.5,
        };
        candidate.score = 0.3 * candidate.score + 0.7 * llm_score;
    }
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(top_k);
    candidates
}

fn parse_relevance_score(text: &str) -> f64 {
    text.trim()
        .split_whitespace()
        .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit() && c != '.').parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.5)
}

/// Reorders `candidates` (already sorted descending by score) into the
/// high-low-mid pattern that counters "lost in the middle".
pub fn repack(candidates: Vec<SearchResult>) -> Vec<SearchResult> {
    repack_high_low_mid(candidates)
}

/// Runs the configured subset of enhancement operations in the order
/// the pipeline expects them applied.
pub async fn enhance_and_finalize(
    llm: Arc<dyn LLMProvider>,
    query: &str,
    options: EnhancerOptions,
    candidates: Vec<SearchResult>,
) -> Vec<SearchResult> {
    let mut candidates = candidates;
    if options.rerank {
        candidates = rerank(llm.as_ref(), query, candidates, options.rerank_top_k).await;
    }
    if options.repack {
        candidates = repack(candidates);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "content".into(),
            score,
            metadata: None,
        }
    }

    #[test]
    fn parse_relevance_score_handles_plain_number() {
        assert_eq!(parse_relevance_score("0.8"), 0.8);
    }

    #[test]
    fn parse_relevance_score_defaults_on_garbage() {
        assert_eq!(parse_relevance_score("I cannot say"), 0.5);
    }

    #[test]
    fn parse_relevance_score_clamps_out_of_range() {
        assert_eq!(parse_relevance_score("4.2"), 1.0);
    }

    #[test]
    fn merge_result_lists_single_list_passthrough() {
        let lists = vec![vec![result("a", 0.9), result("b", 0.5)]];
        let merged = merge_result_lists(lists);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_result_lists_fuses_and_dedups() {
        let lists = vec![vec![result("a", 0.1), result("b", 0.1)], vec![result("b", 0.1), result("a", 0.1)]];
        let merged = merge_result_lists(lists);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].score - merged[1].score).abs() < 1e-9);
    }

    #[test]
    fn repack_reorders_high_low_mid() {
        let candidates = vec![result("a", 0.9), result("b", 0.8), result("c", 0.7)];
        let out = repack(candidates);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[2].id, "b");
    }
}
