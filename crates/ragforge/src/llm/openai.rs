//! OpenAI-backed [`LLMProvider`].
//!
//! Calls the `/v1/embeddings` and `/v1/chat/completions` endpoints.
//! Requires `OPENAI_API_KEY` in the environment. Every call runs
//! through [`crate::resilience::call_with_resilience`]: retried on HTTP
//! 429/5xx with exponential backoff, gated by a circuit breaker that
//! opens after repeated failures; fails immediately on other 4xx
//! responses or a missing API key. `base_url` defaults to
//! `https://api.openai.com` and can be overridden for OpenAI-compatible
//! backends or stubbed out with `mockito` in tests.

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatMessage, GenerateResponse, LLMProvider, LlmError, TokenUsage};
use crate::config::{LlmConfig, ResilienceConfig};
use crate::resilience::{call_with_resilience, BreakerState, CircuitBreaker, ResilienceError};

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    resilience: ResilienceConfig,
    breaker: CircuitBreaker,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig, resilience: ResilienceConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        let embedding_model = config
            .embedding_model
            .clone()
            .ok_or_else(|| LlmError::Config("llm.embedding_model is required for the openai provider".into()))?;
        let chat_model = config
            .model
            .clone()
            .ok_or_else(|| LlmError::Config("llm.model is required for the openai provider".into()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let breaker = CircuitBreaker::from_config(&resilience);

        Ok(OpenAiProvider {
            client,
            base_url,
            api_key,
            embedding_model,
            chat_model,
            resilience,
            breaker,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = serde_json::json!({ "model": self.embedding_model, "input": texts });
        let url = format!("{}/v1/embeddings", self.base_url);
        unwrap_resilience(
            call_with_resilience(&self.resilience, &self.breaker, || async {
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| LlmError::Http(e.to_string()))?;
                handle_status(&resp)?;
                let json: serde_json::Value = resp.json().await.map_err(|e| LlmError::Malformed(e.to_string()))?;
                parse_embeddings(&json)
            })
            .await,
        )
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<GenerateResponse, LlmError> {
        let messages = vec![
            serde_json::json!({"role": "system", "content": system_prompt}),
            serde_json::json!({"role": "user", "content": prompt}),
        ];
        self.chat_completion(messages).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let payload: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();
        Ok(self.chat_completion(payload).await?.content)
    }

    fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

impl OpenAiProvider {
    async fn chat_completion(&self, messages: Vec<serde_json::Value>) -> Result<GenerateResponse, LlmError> {
        let body = serde_json::json!({ "model": self.chat_model, "messages": messages });
        let url = format!("{}/v1/chat/completions", self.base_url);
        unwrap_resilience(
            call_with_resilience(&self.resilience, &self.breaker, || async {
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| LlmError::Http(e.to_string()))?;
                handle_status(&resp)?;
                let json: serde_json::Value = resp.json().await.map_err(|e| LlmError::Malformed(e.to_string()))?;
                parse_chat_response(&json)
            })
            .await,
        )
    }
}

fn unwrap_resilience<T>(result: Result<T, ResilienceError<LlmError>>) -> Result<T, LlmError> {
    match result {
        Ok(v) => Ok(v),
        Err(ResilienceError::CircuitOpen) => Err(LlmError::CircuitOpen("openai provider breaker is open".into())),
        Err(ResilienceError::Inner(e)) => Err(e),
    }
}

fn handle_status(resp: &reqwest::Response) -> Result<(), LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 429 || status.is_server_error() {
        return Err(LlmError::Http(format!("openai api error {status}")));
    }
    Err(LlmError::Config(format!("openai api error {status}")))
}

fn parse_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, LlmError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| LlmError::Malformed("missing data array".into()))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                .ok_or_else(|| LlmError::Malformed("missing embedding field".into()))
        })
        .collect()
}

fn parse_chat_response(json: &serde_json::Value) -> Result<GenerateResponse, LlmError> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".into()))?
        .to_string();

    let usage = json.get("usage").map(|u| TokenUsage {
        prompt_tokens: u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
        completion_tokens: u.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0),
    });

    Ok(GenerateResponse { content, usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embeddings_extracts_vectors_in_order() {
        let json = serde_json::json!({
            "data": [
                {"embedding": [0.1, 0.2]},
                {"embedding": [0.3, 0.4]}
            ]
        });
        let out = parse_embeddings(&json).unwrap();
        assert_eq!(out, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn parse_embeddings_rejects_missing_data() {
        let json = serde_json::json!({});
        assert!(parse_embeddings(&json).is_err());
    }

    #[test]
    fn parse_chat_response_extracts_content_and_usage() {
        let json = serde_json::json!({
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        });
        let resp = parse_chat_response(&json).unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage.unwrap().prompt_tokens, 10);
    }

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            model: Some("gpt-4o-mini".to_string()),
            embedding_model: Some("text-embedding-3-small".to_string()),
            base_url: Some(base_url),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn embed_posts_to_the_configured_base_url() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[0.1,0.2]}]}"#)
            .create_async()
            .await;

        let provider = OpenAiProvider::new(&test_config(server.url()), ResilienceConfig::default()).unwrap();
        let out = provider.embed(&["hello".to_string()]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(out, vec![vec![0.1, 0.2]]);
    }

    #[tokio::test]
    async fn generate_retries_on_5xx_then_succeeds() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let mut server = mockito::Server::new_async().await;
        let fail = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"hi there"}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let resilience = ResilienceConfig { initial_delay_ms: 1, max_delay_ms: 5, ..ResilienceConfig::default() };
        let provider = OpenAiProvider::new(&test_config(server.url()), resilience).unwrap();
        let resp = provider.generate("question", "system").await.unwrap();

        fail.assert_async().await;
        ok.assert_async().await;
        assert_eq!(resp.content, "hi there");
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit_breaker() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let mut server = mockito::Server::new_async().await;
        let _fail = server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .create_async()
            .await;

        let resilience = ResilienceConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            breaker_max_failures: 1,
            breaker_timeout_secs: 60,
            ..ResilienceConfig::default()
        };
        let provider = OpenAiProvider::new(&test_config(server.url()), resilience).unwrap();

        let first = provider.embed(&["hello".to_string()]).await;
        assert!(first.is_err());
        assert_eq!(provider.breaker_state(), BreakerState::Open);

        let second = provider.embed(&["hello".to_string()]).await;
        assert!(matches!(second, Err(LlmError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn a_client_error_fails_without_retrying() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let provider = OpenAiProvider::new(&test_config(server.url()), ResilienceConfig::default()).unwrap();
        let err = provider.embed(&["hello".to_string()]).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::Config(_)));
    }
}
