//! Ollama-backed [`LLMProvider`], for self-hosted model serving.
//!
//! Talks to a local (or configured) Ollama instance's `/api/embeddings`
//! and `/api/chat` endpoints. No API key is required; `base_url`
//! defaults to `http://localhost:11434`.

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatMessage, GenerateResponse, LLMProvider, LlmError};
use crate::config::{LlmConfig, ResilienceConfig};
use crate::resilience::{call_with_resilience, BreakerState, CircuitBreaker, ResilienceError};

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    resilience: ResilienceConfig,
    breaker: CircuitBreaker,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig, resilience: ResilienceConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let embedding_model = config
            .embedding_model
            .clone()
            .ok_or_else(|| LlmError::Config("llm.embedding_model is required for the ollama provider".into()))?;
        let chat_model = config
            .model
            .clone()
            .ok_or_else(|| LlmError::Config("llm.model is required for the ollama provider".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let breaker = CircuitBreaker::from_config(&resilience);

        Ok(OllamaProvider {
            client,
            base_url,
            embedding_model,
            chat_model,
            resilience,
            breaker,
        })
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({ "model": self.embedding_model, "prompt": text });
            let url = format!("{}/api/embeddings", self.base_url);
            let embedding = unwrap_resilience(
                call_with_resilience(&self.resilience, &self.breaker, || async {
                    let resp = self
                        .client
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| LlmError::Http(e.to_string()))?;
                    if !resp.status().is_success() {
                        return Err(classify_status(resp.status()));
                    }
                    let json: serde_json::Value = resp.json().await.map_err(|e| LlmError::Malformed(e.to_string()))?;
                    json.get("embedding")
                        .and_then(|e| e.as_array())
                        .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                        .ok_or_else(|| LlmError::Malformed("missing embedding field".into()))
                })
                .await,
            )?;
            out.push(embedding);
        }
        Ok(out)
    }

    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<GenerateResponse, LlmError> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(prompt)];
        let content = self.chat(&messages).await?;
        Ok(GenerateResponse { content, usage: None })
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let payload: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();
        let body = serde_json::json!({ "model": self.chat_model, "messages": payload, "stream": false });
        let url = format!("{}/api/chat", self.base_url);

        unwrap_resilience(
            call_with_resilience(&self.resilience, &self.breaker, || async {
                let resp = self
                    .client
                    .post(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| LlmError::Http(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(classify_status(resp.status()));
                }
                let json: serde_json::Value = resp.json().await.map_err(|e| LlmError::Malformed(e.to_string()))?;
                json.get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(|c| c.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| LlmError::Malformed("missing message.content".into()))
            })
            .await,
        )
    }

    fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

fn unwrap_resilience<T>(result: Result<T, ResilienceError<LlmError>>) -> Result<T, LlmError> {
    match result {
        Ok(v) => Ok(v),
        Err(ResilienceError::CircuitOpen) => Err(LlmError::CircuitOpen("ollama provider breaker is open".into())),
        Err(ResilienceError::Inner(e)) => Err(e),
    }
}

fn classify_status(status: reqwest::StatusCode) -> LlmError {
    if status.as_u16() == 429 || status.is_server_error() {
        LlmError::Http(format!("ollama api error {status}"))
    } else {
        LlmError::Config(format!("ollama api error {status}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            model: Some("llama3".to_string()),
            embedding_model: Some("nomic-embed-text".to_string()),
            base_url: Some(base_url),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn new_defaults_base_url_when_unset() {
        let provider = OllamaProvider::new(&LlmConfig { model: Some("llama3".into()), embedding_model: Some("nomic-embed-text".into()), ..LlmConfig::default() }, ResilienceConfig::default()).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn embed_posts_one_request_per_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embedding":[1.0,2.0]}"#)
            .expect(2)
            .create_async()
            .await;

        let provider = OllamaProvider::new(&test_config(server.url()), ResilienceConfig::default()).unwrap();
        let out = provider.embed(&["a".to_string(), "b".to_string()]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(out, vec![vec![1.0, 2.0], vec![1.0, 2.0]]);
    }

    #[tokio::test]
    async fn chat_parses_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":{"content":"hello there"}}"#)
            .create_async()
            .await;

        let provider = OllamaProvider::new(&test_config(server.url()), ResilienceConfig::default()).unwrap();
        let out = provider.chat(&[ChatMessage::user("hi")]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(out, "hello there");
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit_breaker() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/api/chat").with_status(500).create_async().await;

        let resilience = ResilienceConfig {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            breaker_max_failures: 1,
            breaker_timeout_secs: 60,
            ..ResilienceConfig::default()
        };
        let provider = OllamaProvider::new(&test_config(server.url()), resilience).unwrap();

        let first = provider.chat(&[ChatMessage::user("hi")]).await;
        assert!(first.is_err());
        assert_eq!(provider.breaker_state(), BreakerState::Open);

        let second = provider.chat(&[ChatMessage::user("hi")]).await;
        assert!(matches!(second, Err(LlmError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn a_server_error_is_retried_then_fails_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let resilience = ResilienceConfig { max_attempts: 2, initial_delay_ms: 1, max_delay_ms: 5, ..ResilienceConfig::default() };
        let provider = OllamaProvider::new(&test_config(server.url()), resilience).unwrap();
        let err = provider.chat(&[ChatMessage::user("hi")]).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, LlmError::Http(_)));
    }
}
