//! OpenAI-compatible provider.
//!
//! Works with any endpoint that implements `POST {base_url}/chat/completions` with
//! `response_format: json_schema` (OpenAI, vLLM, Ollama, LiteLLM proxies).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::prompt::{self, Prompt};
use crate::provider::{AiProvider, Generated};
use crate::result::AiError;
use crate::types::{
    ComponentRegenerationRequest, ExpandedSection, LessonContent, LessonContentRequest,
    OutlineRequest, OutlineSkeleton, SectionExpansionRequest,
};

/// Provider backed by an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AiError::InvalidInput(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: Some(0.4),
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send one prompt and decode the JSON answer into `T`.
    async fn complete_json<T: DeserializeOwned>(&self, prompt: Prompt) -> Result<Generated<T>, AiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: prompt.schema_name,
                    schema: &prompt.schema,
                },
            },
        };

        let mut request = self.client.post(self.chat_completions_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1_000));
            return Err(AiError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!("HTTP {status}: {text}")));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::malformed(format!("invalid completion envelope: {e}")))?;

        let choice = chat
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::malformed("no choices in response"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            return Err(AiError::malformed("output truncated by the provider token limit"));
        }

        let content = choice
            .message
            .content
            .ok_or_else(|| AiError::malformed("empty message content"))?;

        let output: T = serde_json::from_str(&content)
            .map_err(|e| AiError::malformed(format!("{} did not match schema: {e}", prompt.schema_name)))?;

        let tokens_used = chat.usage.map(|u| u.total_tokens).unwrap_or(0);
        debug!(model = %self.model, schema = prompt.schema_name, tokens_used, "provider call completed");

        Ok(Generated::new(output, tokens_used))
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.model
    }

    async fn generate_outline_skeleton(
        &self,
        request: &OutlineRequest,
    ) -> Result<Generated<OutlineSkeleton>, AiError> {
        let generated: Generated<OutlineSkeleton> =
            self.complete_json(prompt::outline_skeleton(request)).await?;
        generated.output.validate()?;
        Ok(generated)
    }

    async fn expand_section(
        &self,
        request: &SectionExpansionRequest,
    ) -> Result<Generated<ExpandedSection>, AiError> {
        let generated: Generated<ExpandedSection> =
            self.complete_json(prompt::section_expansion(request)).await?;
        generated.output.validate()?;
        Ok(generated)
    }

    async fn generate_lesson_content(
        &self,
        request: &LessonContentRequest,
    ) -> Result<Generated<LessonContent>, AiError> {
        let generated: Generated<LessonContent> =
            self.complete_json(prompt::lesson_content(request)).await?;
        generated.output.validate()?;
        Ok(generated)
    }

    async fn regenerate_component(
        &self,
        request: &ComponentRegenerationRequest,
    ) -> Result<Generated<JsonValue>, AiError> {
        if request.instruction.trim().is_empty() {
            return Err(AiError::InvalidInput("instruction must not be empty".to_string()));
        }

        let generated: Generated<ComponentEnvelope> =
            self.complete_json(prompt::component_regeneration(request)).await?;
        if generated.output.content.is_null() {
            return Err(AiError::malformed("regenerated component has no content"));
        }
        Ok(Generated::new(generated.output.content, generated.tokens_used))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    schema: &'a JsonValue,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<UsageResponse>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ComponentEnvelope {
    content: JsonValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn outline_request() -> OutlineRequest {
        OutlineRequest {
            course_title: "Onboarding".to_string(),
            desired_outcome: "Productive in a week".to_string(),
            knowledge: vec![],
            audience: vec![],
            additional_context: None,
        }
    }

    fn completion(content: JsonValue, total_tokens: u64) -> JsonValue {
        json!({
            "choices": [{
                "message": {"content": content.to_string()},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": total_tokens}
        })
    }

    fn provider(server: &MockServer) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            format!("{}/v1/", server.uri()),
            "test-model",
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn decodes_outline_skeleton_and_token_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                json!({"sections": [
                    {"title": "Day one", "description": "Setup", "lesson_titles": ["Laptop", "Accounts"]}
                ]}),
                321,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let generated = provider(&server)
            .generate_outline_skeleton(&outline_request())
            .await
            .unwrap();

        assert_eq!(generated.tokens_used, 321);
        assert_eq!(generated.output.sections.len(), 1);
        assert_eq!(generated.output.sections[0].lesson_titles, vec!["Laptop", "Accounts"]);
    }

    #[tokio::test]
    async fn schema_mismatch_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({"oops": true}), 10)))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_outline_skeleton(&outline_request())
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_outline_skeleton(&outline_request())
            .await
            .unwrap_err();

        assert_eq!(err, AiError::RateLimited { retry_after_ms: Some(7_000) });
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "18446744073709551615"),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_outline_skeleton(&outline_request())
            .await
            .unwrap_err();

        assert_eq!(err, AiError::RateLimited { retry_after_ms: Some(u64::MAX) });
    }

    #[tokio::test]
    async fn server_error_is_request_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate_outline_skeleton(&outline_request())
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::RequestFailed(ref msg) if msg.contains("boom")));
    }
}
