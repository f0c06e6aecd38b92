//! LLM provider registry: a tagged-variant factory table mapping a
//! configured provider name to a constructor, mirroring the reference
//! app's `ConnectorRegistry`/`ToolRegistry` extension pattern (register
//! factories up front, resolve by name at startup).

use std::collections::HashMap;
use std::sync::Arc;

use super::{ollama::OllamaProvider, openai::OpenAiProvider, LLMProvider, LlmError};
use crate::config::{LlmConfig, ResilienceConfig};

type Factory = Box<dyn Fn(&LlmConfig, ResilienceConfig) -> Result<Arc<dyn LLMProvider>, LlmError> + Send + Sync>;

pub struct LlmRegistry {
    factories: HashMap<String, Factory>,
}

impl LlmRegistry {
    pub fn new() -> Self {
        LlmRegistry {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-loaded with the built-in `openai` and `ollama`
    /// providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("openai", |cfg, resilience| {
            Ok(Arc::new(OpenAiProvider::new(cfg, resilience)?) as Arc<dyn LLMProvider>)
        });
        registry.register("ollama", |cfg, resilience| {
            Ok(Arc::new(OllamaProvider::new(cfg, resilience)?) as Arc<dyn LLMProvider>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&LlmConfig, ResilienceConfig) -> Result<Arc<dyn LLMProvider>, LlmError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, config: &LlmConfig, resilience: ResilienceConfig) -> Result<Arc<dyn LLMProvider>, LlmError> {
        let factory = self
            .factories
            .get(config.provider.as_str())
            .ok_or_else(|| LlmError::Config(format!("unknown llm provider: {}", config.provider)))?;
        factory(config, resilience)
    }
}

impl Default for LlmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_errors() {
        let registry = LlmRegistry::with_builtins();
        let cfg = LlmConfig {
            provider: "made-up".to_string(),
            ..Default::default()
        };
        let result = registry.create(&cfg, ResilienceConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn openai_without_api_key_env_errors() {
        std::env::remove_var("OPENAI_API_KEY");
        let registry = LlmRegistry::with_builtins();
        let cfg = LlmConfig {
            provider: "openai".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            embedding_model: Some("text-embedding-3-small".to_string()),
            ..Default::default()
        };
        let result = registry.create(&cfg, ResilienceConfig::default());
        assert!(result.is_err());
    }
}
