//! Replicate predictions provider.
//!
//! Creates a prediction with `Prefer: wait` so short completions come back in
//! the first response. Predictions still running after the wait window are
//! polled until they finish.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::ReplicateConfig;
use crate::error::LlmError;
use crate::llm::openai::{retry_after, status_error};
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

const PROVIDER: &str = "replicate";

/// Chat template for Llama-3 style instruct models.
const DEFAULT_PROMPT_TEMPLATE: &str = "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n{system_prompt}<|eot_id|><|start_header_id|>instructions<|end_header_id|>\n{prompt}<|eot_id|><|start_header_id|>response<|end_header_id|>\n";

/// Replicate API provider.
pub struct ReplicateProvider {
    client: Client,
    config: ReplicateConfig,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateProvider {
    /// Create a provider. Fails without an API token or model version.
    pub fn new(config: ReplicateConfig) -> Result<Self, LlmError> {
        if config.api_token.is_none() {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }
        if config.model_version.trim().is_empty() {
            return Err(LlmError::Config {
                reason: "REPLICATE_MODEL_VERSION is not set".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Ok(Self {
            client,
            config,
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        })
    }

    /// Override polling cadence.
    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn token(&self) -> String {
        self.config
            .api_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_default()
    }

    /// Endpoint and optional version for the configured model.
    ///
    /// `owner/name:hash` and bare hashes go to `/v1/predictions` with a
    /// version; `owner/name` goes to the model's own predictions endpoint.
    fn target(&self) -> (String, Option<String>) {
        let model = self.config.model_version.trim();
        match model.split_once(':') {
            Some((_, version)) => (
                format!("{}/v1/predictions", self.base()),
                Some(version.to_string()),
            ),
            None if model.contains('/') => {
                (format!("{}/v1/models/{}/predictions", self.base(), model), None)
            }
            None => (
                format!("{}/v1/predictions", self.base()),
                Some(model.to_string()),
            ),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Prediction, LlmError> {
        let response = request
            .bearer_auth(self.token())
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Replicate request failed: {}", e);
                LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let response_text = response.text().await.unwrap_or_default();

        tracing::debug!("Replicate response status: {}", status);

        if !status.is_success() {
            return Err(status_error(PROVIDER, status, retry_after, response_text));
        }

        serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("JSON parse error: {}. Raw: {}", e, response_text),
        })
    }

    async fn wait_for(&self, mut prediction: Prediction) -> Result<Prediction, LlmError> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(LlmError::Timeout {
                    provider: PROVIDER.to_string(),
                    timeout: self.poll_interval * self.max_polls,
                });
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;

            let url = format!("{}/v1/predictions/{}", self.base(), prediction.id);
            prediction = self.send(self.client.get(&url)).await?;
        }
        Ok(prediction)
    }
}

#[async_trait]
impl LlmProvider for ReplicateProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (url, version) = self.target();
        let body = PredictionRequest {
            version,
            input: PredictionInput {
                prompt: req.flattened_prompt(),
                system_prompt: req.system_prompt().unwrap_or_default().to_string(),
                temperature: req.temperature.unwrap_or(1.0),
                max_tokens: req.max_tokens.unwrap_or(500),
                top_p: 1.0,
                prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            },
        };

        tracing::debug!("Creating Replicate prediction: {}", url);

        let created = self
            .send(self.client.post(&url).header("Prefer", "wait").json(&body))
            .await?;
        let prediction = self.wait_for(created).await?;

        match prediction.status.as_str() {
            "succeeded" => Ok(CompletionResponse {
                content: prediction.output_text(),
                finish_reason: FinishReason::Stop,
                input_tokens: 0,
                output_tokens: 0,
            }),
            other => Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!(
                    "prediction {} {}: {}",
                    prediction.id,
                    other,
                    prediction.error.unwrap_or_default()
                ),
            }),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model_version
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    prompt: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    prompt_template: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// Output is either a list of streamed chunks or a single string.
    fn output_text(&self) -> String {
        match &self.output {
            Some(serde_json::Value::Array(chunks)) => chunks
                .iter()
                .filter_map(|c| c.as_str())
                .collect::<Vec<_>>()
                .concat(),
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ChatMessage;
    use mockito::Matcher;
    use secrecy::SecretString;
    use serde_json::json;

    fn config(base_url: &str, model: &str) -> ReplicateConfig {
        ReplicateConfig {
            api_token: Some(SecretString::from("r8-test")),
            model_version: model.to_string(),
            base_url: base_url.to_string(),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("Hello")])
            .with_temperature(0.8)
    }

    #[test]
    fn test_requires_token_and_model() {
        let mut cfg = config("http://localhost", "abc");
        cfg.api_token = None;
        assert!(matches!(
            ReplicateProvider::new(cfg),
            Err(LlmError::AuthFailed { .. })
        ));
        assert!(matches!(
            ReplicateProvider::new(config("http://localhost", " ")),
            Err(LlmError::Config { .. })
        ));
    }

    #[test]
    fn test_target_selection() {
        let p = ReplicateProvider::new(config("http://r", "meta/llama:abc123")).unwrap();
        assert_eq!(
            p.target(),
            ("http://r/v1/predictions".to_string(), Some("abc123".to_string()))
        );

        let p = ReplicateProvider::new(config("http://r/", "meta/llama")).unwrap();
        assert_eq!(
            p.target(),
            ("http://r/v1/models/meta/llama/predictions".to_string(), None)
        );

        let p = ReplicateProvider::new(config("http://r", "abc123")).unwrap();
        assert_eq!(p.target().1, Some("abc123".to_string()));
    }

    #[test]
    fn test_output_chunks_joined() {
        let prediction = Prediction {
            id: "p1".to_string(),
            status: "succeeded".to_string(),
            output: Some(json!(["Hel", "lo", " world"])),
            error: None,
        };
        assert_eq!(prediction.output_text(), "Hello world");
    }

    #[tokio::test]
    async fn test_complete_waits_inline() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/predictions")
            .match_header("prefer", "wait")
            .match_header("authorization", "Bearer r8-test")
            .match_body(Matcher::PartialJson(json!({
                "version": "abc123",
                "input": {"prompt": "Hello", "system_prompt": "sys", "max_tokens": 500}
            })))
            .with_status(201)
            .with_body(
                json!({"id": "p1", "status": "succeeded", "output": ["hi", " there"]})
                    .to_string(),
            )
            .create_async()
            .await;

        let provider = ReplicateProvider::new(config(&server.url(), "abc123")).unwrap();
        let response = provider.complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hi there");
    }

    #[tokio::test]
    async fn test_complete_polls_until_done() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/v1/predictions")
            .with_status(201)
            .with_body(json!({"id": "p2", "status": "processing"}).to_string())
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/v1/predictions/p2")
            .with_status(200)
            .with_body(json!({"id": "p2", "status": "succeeded", "output": "done"}).to_string())
            .create_async()
            .await;

        let provider = ReplicateProvider::new(config(&server.url(), "abc123"))
            .unwrap()
            .with_polling(Duration::from_millis(1), 3);
        let response = provider.complete(request()).await.unwrap();

        poll.assert_async().await;
        assert_eq!(response.content, "done");
    }

    #[tokio::test]
    async fn test_failed_prediction() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/v1/predictions")
            .with_status(201)
            .with_body(
                json!({"id": "p3", "status": "failed", "error": "CUDA out of memory"})
                    .to_string(),
            )
            .create_async()
            .await;

        let provider = ReplicateProvider::new(config(&server.url(), "abc123")).unwrap();
        match provider.complete(request()).await {
            Err(LlmError::RequestFailed { reason, .. }) => {
                assert!(reason.contains("CUDA out of memory"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/v1/predictions")
            .with_status(429)
            .with_header("retry-after", "12")
            .create_async()
            .await;

        let provider = ReplicateProvider::new(config(&server.url(), "abc123")).unwrap();
        assert!(matches!(
            provider.complete(request()).await,
            Err(LlmError::RateLimited {
                retry_after: Some(d),
                ..
            }) if d == Duration::from_secs(12)
        ));
    }
}
