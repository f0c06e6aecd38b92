//! REST-backed [`VectorStore`] client.
//!
//! Talks to an external vector database over HTTP using a small
//! generic JSON contract (`POST /collections`, `POST /collections/:name/points`,
//! `POST /collections/:name/search`, `GET /collections/:name/stats`). Any
//! vector database can sit behind this contract via a thin adapter
//! service; this client does not assume a specific vendor's wire
//! format, matching the reqwest request/response pattern the LLM
//! providers use.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragforge_core::models::Chunk;
use ragforge_core::store::{CollectionStats, FilterExpr, StoreHit, VectorStore};

pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(HttpVectorStore {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct CreateCollectionBody {
    name: String,
    dim: usize,
}

#[derive(Serialize)]
struct InsertBody<'a> {
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct InsertResponse {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct SearchBody {
    embedding: Vec<f32>,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<WireFilter>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<StoreHit>,
}

/// `FilterExpr` serialized as a tagged JSON value so the wire contract
/// doesn't depend on the server knowing Rust enum layouts.
#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireFilter {
    LevelEq { level: u32 },
    NodeTypeEq { node_type: ragforge_core::models::NodeType },
    DocumentIdEq { document_id: String },
    ParentIdEq { parent_id: String },
    And { left: Box<WireFilter>, right: Box<WireFilter> },
    Or { left: Box<WireFilter>, right: Box<WireFilter> },
}

impl From<&FilterExpr> for WireFilter {
    fn from(f: &FilterExpr) -> Self {
        match f {
            FilterExpr::LevelEq(l) => WireFilter::LevelEq { level: *l },
            FilterExpr::NodeTypeEq(t) => WireFilter::NodeTypeEq { node_type: *t },
            FilterExpr::DocumentIdEq(id) => WireFilter::DocumentIdEq { document_id: id.clone() },
            FilterExpr::ParentIdEq(id) => WireFilter::ParentIdEq { parent_id: id.clone() },
            FilterExpr::And(a, b) => WireFilter::And {
                left: Box::new(a.as_ref().into()),
                right: Box::new(b.as_ref().into()),
            },
            FilterExpr::Or(a, b) => WireFilter::Or {
                left: Box::new(a.as_ref().into()),
                right: Box::new(b.as_ref().into()),
            },
        }
    }
}

#[derive(Deserialize)]
struct StatsResponse {
    row_count: u64,
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn create_collection(&self, name: &str, dim: usize) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/collections", self.base_url))
            .json(&CreateCollectionBody { name: name.to_string(), dim })
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }

    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<Vec<String>> {
        let resp = self
            .client
            .post(format!("{}/collections/{collection}/points", self.base_url))
            .json(&InsertBody { chunks })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed: InsertResponse = resp.json().await?;
        Ok(parsed.ids)
    }

    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<StoreHit>> {
        let body = SearchBody {
            embedding: embedding.to_vec(),
            top_k,
            filter: None,
        };
        self.do_search(collection, body).await
    }

    async fn search_with_filter(
        &self,
        collection: &str,
        embedding: &[f32],
        filter: &FilterExpr,
        top_k: usize,
    ) -> Result<Vec<StoreHit>> {
        let body = SearchBody {
            embedding: embedding.to_vec(),
            top_k,
            filter: Some(filter.into()),
        };
        self.do_search(collection, body).await
    }

    async fn get_stats(&self, collection: &str) -> Result<CollectionStats> {
        let resp = self
            .client
            .get(format!("{}/collections/{collection}/stats", self.base_url))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed: StatsResponse = resp.json().await?;
        Ok(CollectionStats { row_count: parsed.row_count })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl HttpVectorStore {
    async fn do_search(&self, collection: &str, body: SearchBody) -> Result<Vec<StoreHit>> {
        let resp = self
            .client
            .post(format!("{}/collections/{collection}/search", self.base_url))
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let parsed: SearchResponse = resp.json().await?;
        Ok(parsed.hits)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(anyhow!("vector store request failed: {status} {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_core::models::NodeType;

    #[test]
    fn wire_filter_preserves_and_or_structure() {
        let expr = FilterExpr::LevelEq(0).and(FilterExpr::NodeTypeEq(NodeType::Leaf));
        let wire: WireFilter = (&expr).into();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["op"], "and");
        assert_eq!(json["left"]["op"], "level_eq");
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let store = HttpVectorStore::new("http://localhost:9000/").unwrap();
        assert_eq!(store.base_url, "http://localhost:9000");
    }
}
