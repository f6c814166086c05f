//! LLM provider trait and request/response types.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request for a text completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// System prompt, if the first message is one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// All non-system messages joined into one prompt string.
    pub fn flattened_prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Why a completion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw.unwrap_or("") {
            s if s.contains("stop") => Self::Stop,
            s if s.contains("length") => Self::Length,
            s if s.contains("content_filter") => Self::ContentFilter,
            _ => Self::Unknown,
        }
    }
}

/// Completion result.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A text completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a request.
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Model identifier sent with requests.
    fn model_name(&self) -> &str;

    /// Short provider name for logs.
    fn provider_name(&self) -> &str;
}

/// Text in, text out. Output is trimmed.
pub async fn complete_text(
    provider: &Arc<dyn LlmProvider>,
    prompt: &str,
    system_prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.push(ChatMessage::user(prompt));

    let request = CompletionRequest::new(messages)
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);
    let response = provider.complete(request).await?;

    if response.finish_reason == FinishReason::Length {
        tracing::debug!(
            "Completion from {} hit the token limit ({} output tokens)",
            provider.provider_name(),
            response.output_tokens
        );
    }
    Ok(response.content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::user("again"),
        ])
        .with_temperature(0.9)
        .with_max_tokens(500);

        assert_eq!(req.temperature, Some(0.9));
        assert_eq!(req.max_tokens, Some(500));
        assert_eq!(req.system_prompt(), Some("be brief"));
        assert_eq!(req.flattened_prompt(), "hello\n\nagain");
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_api(Some("stop")), FinishReason::Stop);
        assert_eq!(FinishReason::from_api(Some("length")), FinishReason::Length);
        assert_eq!(
            FinishReason::from_api(Some("content_filter")),
            FinishReason::ContentFilter
        );
        assert_eq!(FinishReason::from_api(None), FinishReason::Unknown);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: format!("  {}  ", req.flattened_prompt()),
                finish_reason: FinishReason::Stop,
                input_tokens: 0,
                output_tokens: 0,
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn provider_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_complete_text_trims() {
        let provider: Arc<dyn LlmProvider> = Arc::new(Echo);
        let text = complete_text(&provider, "hi there", "", 0.5, 10).await.unwrap();
        assert_eq!(text, "hi there");
    }
}
