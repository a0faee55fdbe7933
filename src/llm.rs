//! Proposal source client
//!
//! Single-shot chat-completions call against the OpenRouter endpoint. The
//! worker makes exactly one model request per run and never retries; a
//! failed or rate-limited call fails the run before any mutation happens.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_TOKENS: u32 = 8192;

/// One role/content pair in the request conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

/// Chat-completions client bound to one model id.
pub struct ModelClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ModelClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: OPENROUTER_URL.to_string(),
        })
    }

    /// Point the client at a different completions endpoint (test servers).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Send the conversation and return the first choice's text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "patchbot")
            .json(&request)
            .send()
            .await
            .context("Model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match status.as_u16() {
                401 => "Invalid model API key".to_string(),
                429 => "Rate limited by the model endpoint".to_string(),
                500..=599 => format!(
                    "Model endpoint server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("Model API error {}: {}", status, truncate_str(&text, 200)),
            };
            anyhow::bail!("{}", message);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse model response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Model returned no choices")
    }
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
