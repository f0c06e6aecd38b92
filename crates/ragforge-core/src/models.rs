//! Core data types shared by the indexing and query pipelines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Node kind within the hierarchical tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Leaf = 0,
    Intermediate = 1,
    Root = 2,
}

/// A unit of stored content: a leaf chunk or a tree-internal summary node.
///
/// Invariants: `embedding.len()` equals the owning collection's
/// dimension; `level == 0` iff `node_type == Leaf`; `node_type == Root`
/// iff `parent_id` is empty; a non-leaf's `content` is a summary of its
/// children's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub section: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub level: u32,
    pub parent_id: String,
    pub node_type: NodeType,
}

impl Chunk {
    pub fn is_root(&self) -> bool {
        matches!(self.node_type, NodeType::Root)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node_type, NodeType::Leaf)
    }
}

/// A ranked hit returned from retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub section: String,
    pub content: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// In-memory node used only during tree construction/traversal, before
/// it is flattened into a [`Chunk`] and persisted.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub section: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub level: u32,
    pub parent_id: String,
    pub node_type: NodeType,
    pub children: Vec<String>,
}

impl From<&Chunk> for TreeNode {
    fn from(c: &Chunk) -> Self {
        TreeNode {
            id: c.id.clone(),
            document_id: c.document_id.clone(),
            document_name: c.document_name.clone(),
            section: c.section.clone(),
            content: c.content.clone(),
            embedding: c.embedding.clone(),
            level: c.level,
            parent_id: c.parent_id.clone(),
            node_type: c.node_type,
            children: Vec::new(),
        }
    }
}

/// A chunk, stripped of retrieval metadata, as returned alongside an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSource {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub section: String,
    pub content: String,
    pub score: f64,
}

impl From<SearchResult> for ChunkSource {
    fn from(r: SearchResult) -> Self {
        ChunkSource {
            id: r.id,
            document_id: r.document_id,
            document_name: r.document_name,
            section: r.section,
            content: r.content,
            score: r.score,
        }
    }
}

/// The final answer returned to a query, with its supporting sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<ChunkSource>,
}

/// Input to the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationInput {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
}

/// Ragas-style evaluation scores, each in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_precision: f64,
    pub context_recall: Option<f64>,
    pub overall_score: f64,
    pub details: EvaluationDetails,
}

/// Diagnostic detail supporting an [`EvaluationResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationDetails {
    pub extracted_claims: Vec<String>,
    pub supported_claims: usize,
    pub generated_questions: Vec<String>,
    pub relevant_context_indices: Vec<usize>,
}

/// Circuit-breaker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of a circuit breaker's mutable state.
#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    pub state: BreakerState,
    pub failures: u32,
    pub last_failure_time: Option<chrono::DateTime<chrono::Utc>>,
    pub half_open_calls: u32,
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        CircuitBreakerState {
            state: BreakerState::Closed,
            failures: 0,
            last_failure_time: None,
            half_open_calls: 0,
            half_open_successes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_leaf_root_predicates() {
        let leaf = Chunk {
            id: "a".into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "hello".into(),
            embedding: vec![0.1, 0.2],
            level: 0,
            parent_id: "p".into(),
            node_type: NodeType::Leaf,
        };
        assert!(leaf.is_leaf());
        assert!(!leaf.is_root());
    }

    #[test]
    fn chunk_source_from_search_result_drops_metadata() {
        let mut meta = HashMap::new();
        meta.insert("tree_level".to_string(), serde_json::json!(2));
        let r = SearchResult {
            id: "a".into(),
            document_id: "d".into(),
            document_name: "d.md".into(),
            section: "Intro".into(),
            content: "hi".into(),
            score: 0.9,
            metadata: Some(meta),
        };
        let src: ChunkSource = r.into();
        assert_eq!(src.score, 0.9);
    }
}
