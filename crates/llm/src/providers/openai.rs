//! OpenAI-compatible chat completion provider.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI itself, NVIDIA NIM, vLLM, and friends).

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use diligence_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct OpenAiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a new client for the given API key and optional endpoint.
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_chat_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(
            "Sending chat completion request to {} ({})",
            self.endpoint,
            request.model
        );

        let chat_request = self.to_chat_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Chat completion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "Chat completion API error ({}): {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse chat response: {}", e)))?;

        let content = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AppError::Llm("Empty chat completion response".to_string()))?;

        let usage = chat_response.usage.unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: chat_response.model.unwrap_or_else(|| request.model.clone()),
            usage: LlmUsage::new(usage.prompt_tokens, usage.completion_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_conversion() {
        let client = OpenAiClient::new("sk-test", None);
        let request = LlmRequest::new("Hello", "gpt-4o-mini")
            .with_system("Be terse")
            .with_temperature(0.3)
            .with_max_tokens(256);

        let chat_req = client.to_chat_request(&request);
        assert_eq!(chat_req.model, "gpt-4o-mini");
        assert_eq!(chat_req.messages.len(), 2);
        assert_eq!(chat_req.messages[0].role, "system");
        assert_eq!(chat_req.messages[1].content, "Hello");
        assert_eq!(chat_req.temperature, Some(0.3));
    }

    #[test]
    fn test_default_endpoint() {
        let client = OpenAiClient::new("sk-test", None);
        assert_eq!(client.endpoint, DEFAULT_ENDPOINT);

        let custom = OpenAiClient::new("sk-test", Some("https://nim.example/v1/chat/completions"));
        assert_eq!(custom.endpoint, "https://nim.example/v1/chat/completions");
    }
}
