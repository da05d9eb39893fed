//! Completion-service seam: request/response types and the client trait

pub mod azure;
pub mod parse;

use serde::{Deserialize, Serialize};

use crate::error::SynthResult;

pub use azure::AzureOpenAiClient;

/// One part of a user message
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Base64-encoded PNG page image
    PngImage(String),
}

/// A single chat-completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Deployment (model) name
    pub deployment: String,
    pub system: String,
    pub user: Vec<ContentPart>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service for a JSON object
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn text(deployment: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            system: system.into(),
            user: vec![ContentPart::Text(user.into())],
            temperature: 1.0,
            max_tokens: 4_000,
            json_mode: true,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Concatenated text parts, for logging and test assertions
    pub fn user_text(&self) -> String {
        self.user
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::PngImage(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Anything that can answer a chat-completion request.
///
/// One attempt per call; callers decide what a failure means for their item.
#[allow(async_fn_in_trait)]
pub trait CompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> SynthResult<Completion>;
}

/// Seed appended to prompts so consecutive variants differ
pub fn variability_seed() -> u32 {
    (uuid::Uuid::new_v4().as_u128() % 1_000_000) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_skips_images() {
        let mut request = CompletionRequest::text("gpt-4o", "sys", "first");
        request.user.push(ContentPart::PngImage("AAAA".into()));
        request.user.push(ContentPart::Text("second".into()));
        assert_eq!(request.user_text(), "first\nsecond");
    }

    #[test]
    fn seed_is_bounded() {
        for _ in 0..50 {
            assert!(variability_seed() < 1_000_000);
        }
    }
}
