//! LLM integration for content generation.
//!
//! Supports two backends:
//! - **OpenAI** (Chat Completions API): bearer API key, `/v1/chat/completions`
//! - **Replicate** (Predictions API): bearer API token, `/v1/predictions`

mod openai;
mod provider;
mod replicate;

pub use openai::OpenAiChatProvider;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    complete_text,
};
pub use replicate::ReplicateProvider;

use std::sync::Arc;

use crate::config::{LlmConfig, LlmProviderType};
use crate::error::LlmError;

/// Create an LLM provider based on configuration.
///
/// Logs the provider and model once.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderType::OpenAi => Arc::new(OpenAiChatProvider::new(config.openai.clone())?),
        LlmProviderType::Replicate => {
            Arc::new(ReplicateProvider::new(config.replicate.clone())?)
        }
    };

    tracing::info!(
        "Using LLM provider {} with model {}",
        provider.provider_name(),
        provider.model_name()
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OpenAiConfig, ReplicateConfig};
    use secrecy::SecretString;

    fn config(provider: LlmProviderType) -> LlmConfig {
        LlmConfig {
            provider,
            openai: OpenAiConfig {
                api_key: Some(SecretString::from("sk-test")),
                model: "gpt-4o".to_string(),
                base_url: "https://api.openai.com".to_string(),
            },
            replicate: ReplicateConfig {
                api_token: None,
                model_version: String::new(),
                base_url: "https://api.replicate.com".to_string(),
            },
        }
    }

    #[test]
    fn test_create_openai_provider() {
        let provider = create_llm_provider(&config(LlmProviderType::OpenAi)).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn test_create_replicate_without_token_fails() {
        let result = create_llm_provider(&config(LlmProviderType::Replicate));
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }
}
