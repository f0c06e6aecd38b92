//! Query result cache.
//!
//! Keys are derived from the question text alone (`prefix + hex(SHA256(question))`)
//! so identical questions always hit the same entry regardless of
//! retrieval path. Values are JSON-serialized [`QueryResult`]s with a
//! configured TTL.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragforge_core::models::QueryResult;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Returns `Ok(None)` on a miss or a corrupted entry (which is
    /// deleted as a side effect, never surfaced as an error).
    async fn get(&self, question: &str) -> Result<Option<QueryResult>>;
    async fn set(&self, question: &str, result: &QueryResult) -> Result<()>;
}

pub fn cache_key(prefix: &str, question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    format!("{prefix}{:x}", hasher.finalize())
}

/// A cache that is configured off: reads error, writes are silently
/// dropped.
pub struct DisabledCache;

#[async_trait]
impl QueryCache for DisabledCache {
    async fn get(&self, _question: &str) -> Result<Option<QueryResult>> {
        bail!("cache is disabled")
    }

    async fn set(&self, _question: &str, _result: &QueryResult) -> Result<()> {
        Ok(())
    }
}

pub struct RedisCache {
    client: redis::Client,
    prefix: String,
    ttl_secs: u64,
}

impl RedisCache {
    pub fn new(redis_url: &str, prefix: String, ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(RedisCache {
            client,
            prefix,
            ttl_secs,
        })
    }
}

#[async_trait]
impl QueryCache for RedisCache {
    async fn get(&self, question: &str) -> Result<Option<QueryResult>> {
        use redis::AsyncCommands;
        let key = cache_key(&self.prefix, question);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<QueryResult>(&raw) {
            Ok(result) => Ok(Some(result)),
            Err(_) => {
                let _: redis::RedisResult<()> = conn.del(&key).await;
                Ok(None)
            }
        }
    }

    async fn set(&self, question: &str, result: &QueryResult) -> Result<()> {
        use redis::AsyncCommands;
        let key = cache_key(&self.prefix, question);
        let payload = serde_json::to_string(result)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(&key, payload, self.ttl_secs).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_pure_function_of_question() {
        let a = cache_key("p:", "what is rust?");
        let b = cache_key("p:", "what is rust?");
        let c = cache_key("p:", "what is go?");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("p:"));
    }

    #[tokio::test]
    async fn disabled_cache_errors_on_get_and_drops_writes() {
        let cache = DisabledCache;
        let result = QueryResult {
            answer: "hi".into(),
            sources: vec![],
        };
        cache.set("q", &result).await.unwrap();
        assert!(cache.get("q").await.is_err());
    }
}
