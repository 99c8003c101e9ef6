//! `OpenAI`-compatible chat completions backend

use super::{Assistant, AssistantError};
use crate::config::AssistantConfig;
use crate::db::{Message, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely. \
When you include code, use fenced code blocks with a language tag.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAiAssistant {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiAssistant {
    pub fn new(config: &AssistantConfig, api_key: String) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn translate_request(&self, history: &[Message]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: Role::System.as_str().to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    fn classify_error(status: reqwest::StatusCode, body: &str) -> AssistantError {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map_or_else(|_| body.to_string(), |e| e.error.message);

        match status.as_u16() {
            401 | 403 => AssistantError::auth(format!("Authentication failed: {message}")),
            429 => AssistantError::rate_limit(format!("Rate limit exceeded: {message}")),
            400 => AssistantError::invalid_request(format!("Invalid request: {message}")),
            500..=599 => AssistantError::server_error(format!("Server error: {message}")),
            _ => AssistantError::unknown(format!("HTTP {status}: {message}")),
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<String, AssistantError> {
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AssistantError::unknown("No content in response"))
    }
}

#[async_trait]
impl Assistant for OpenAiAssistant {
    async fn reply(&self, history: &[Message]) -> Result<String, AssistantError> {
        let request = self.translate_request(history);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    AssistantError::network(format!("Connection failed: {e}"))
                } else {
                    AssistantError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AssistantError::unknown(format!("Failed to parse response: {e}")))?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
