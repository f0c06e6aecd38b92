//! LLM provider abstraction.
//!
//! [`LLMProvider`] is the contract every backend implements: batch and
//! single-text embedding, single-shot generation, and multi-turn chat.
//! Concrete backends live in [`openai`] and [`ollama`]; [`registry`]
//! maps a configured provider name to a constructed instance.

pub mod ollama;
pub mod openai;
pub mod registry;

use async_trait::async_trait;

use crate::resilience::{BreakerState, Retryable};

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider http error: {0}")]
    Http(String),
    #[error("provider returned malformed response: {0}")]
    Malformed(String),
    #[error("provider configuration error: {0}")]
    Config(String),
    #[error("circuit breaker is open: {0}")]
    CircuitOpen(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Http(_))
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
    async fn embed_single(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut v = self.embed(std::slice::from_ref(&text.to_string())).await?;
        v.pop().ok_or_else(|| LlmError::Malformed("empty embedding response".into()))
    }
    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<GenerateResponse, LlmError>;
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Current circuit breaker state, for metrics exposition. Providers
    /// with no breaker (e.g. test stubs) stay `Closed`.
    fn breaker_state(&self) -> BreakerState {
        BreakerState::Closed
    }
}
