use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Completion, CompletionClient, CompletionRequest, ContentPart, TokenUsage};
use crate::config::AiCredentials;
use crate::error::{GenerationFailure, SynthError, SynthResult};
use crate::logging::PerformanceTimer;

/// Azure OpenAI chat-completions client
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    credentials: AiCredentials,
    truncation_margin: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AzureOpenAiClient {
    pub fn new(credentials: AiCredentials, request_timeout: Duration) -> SynthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SynthError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "🤖 Completion endpoint {} (data: {}, vision: {})",
            credentials.endpoint, credentials.data_deployment, credentials.vision_deployment
        );

        Ok(Self {
            http,
            credentials,
            truncation_margin: 100,
        })
    }

    pub fn with_truncation_margin(mut self, margin: u32) -> Self {
        self.truncation_margin = margin;
        self
    }

    fn request_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.credentials.endpoint.trim_end_matches('/'),
            deployment,
            self.credentials.api_version
        )
    }
}

fn request_body(request: &CompletionRequest) -> ChatRequestBody {
    // Plain string content when there are no images keeps the payload small
    let user_content = match request.user.as_slice() {
        [ContentPart::Text(text)] => Value::String(text.clone()),
        parts => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => json!({"type": "text", "text": text}),
                    ContentPart::PngImage(data) => json!({
                        "type": "image_url",
                        "image_url": {"url": format!("data:image/png;base64,{}", data)}
                    }),
                })
                .collect(),
        ),
    };

    ChatRequestBody {
        messages: vec![
            ChatMessage {
                role: "system",
                content: Value::String(request.system.clone()),
            },
            ChatMessage {
                role: "user",
                content: user_content,
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        response_format: request.json_mode.then(|| json!({"type": "json_object"})),
    }
}

impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> SynthResult<Completion> {
        let _timer = PerformanceTimer::start(format!("completion ({})", request.deployment));
        let url = self.request_url(&request.deployment);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.credentials.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| {
                SynthError::generation_with_source(
                    GenerationFailure::Transport,
                    "completion endpoint unreachable",
                    e,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SynthError::generation(
                GenerationFailure::Status,
                format!("completion endpoint returned {}: {}", status, error_text),
            ));
        }

        let body: ChatResponseBody = response.json().await.map_err(|e| {
            SynthError::generation_with_source(
                GenerationFailure::MalformedJson,
                "completion response was not valid JSON",
                e,
            )
        })?;

        if let Some(usage) = body.usage {
            info!(
                "Token usage - Input: {}, Output: {}, Total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
            if usage.completion_tokens + self.truncation_margin >= request.max_tokens {
                warn!(
                    "⚠️  Response may be truncated - used {} out of {} max tokens",
                    usage.completion_tokens, request.max_tokens
                );
            }
        }

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SynthError::generation(GenerationFailure::EmptyResponse, "no message content in response"))?;

        Ok(Completion {
            content,
            usage: body.usage,
        })
    }
}
