//! HTTP adapter for OpenAI-compatible chat completion APIs (OpenRouter by
//! default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::{ContentProvider, ProviderError, ProviderResponse};
use crate::config::ProviderConfig;
use crate::plan::{GenerationContext, SYSTEM_MESSAGE};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

/// Chat-completions client. Holds one pooled HTTP client for its lifetime.
pub struct OpenRouterProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenRouterProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Provider(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn map_transport_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.config.timeout)
        } else if error.is_connect() {
            ProviderError::Provider(format!("connection error: {error}"))
        } else {
            ProviderError::Provider(format!("HTTP error: {error}"))
        }
    }
}

/// Pull the assistant message text out of a chat-completions body.
fn message_content(body: &serde_json::Value) -> Option<&str> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
}

#[async_trait]
impl ContentProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate(
        &self,
        context: &GenerationContext,
    ) -> Result<ProviderResponse, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Provider("no API key configured".to_string()))?;

        let prompt = context.prompt();
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_MESSAGE,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::info!(
            request_id = %context.request_id,
            week = context.week_number,
            model = %self.config.model,
            "calling content provider"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(error_text),
                _ => ProviderError::Provider(format!("status {status}: {error_text}")),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.config.timeout)
            } else {
                ProviderError::Provider(format!("failed to decode response body: {e}"))
            }
        })?;

        let text = match message_content(&body) {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => return Err(ProviderError::EmptyResponse),
        };

        Ok(ProviderResponse { text, raw: body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> GenerationContext {
        GenerationContext {
            request_id: Uuid::new_v4(),
            week_number: 1,
            total_weeks: 2,
            days_per_week: 3,
            fitness_level: "beginner".into(),
            goal: "General Fitness".into(),
            focus_areas: None,
            profile_summary: "Age: 30".into(),
        }
    }

    fn provider_for(server: &MockServer) -> OpenRouterProvider {
        OpenRouterProvider::new(ProviderConfig {
            api_base: format!("{}/api/v1/", server.uri()),
            api_key: Some("test-key".into()),
            timeout: Duration::from_millis(500),
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_message_content_and_raw_body() {
        let server = MockServer::start().await;
        let body = json!({
            "id": "gen-1",
            "choices": [{"message": {"role": "assistant", "content": "{\"days\": []}"}}]
        });
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server).generate(&context()).await.unwrap();
        assert_eq!(response.text, "{\"days\": []}");
        assert_eq!(response.raw, body);
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&context()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(ref m) if m == "slow down"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&context()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Provider(_)));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn blank_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "  "}}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&context()).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = provider_for(&server).generate(&context()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(ProviderConfig {
            api_base: server.uri(),
            api_key: None,
            ..ProviderConfig::default()
        })
        .unwrap();
        let err = provider.generate(&context()).await.unwrap_err();
        assert!(err.to_string().contains("no API key configured"));
    }
}
