use crate::adapters::llm::{LlmClient, LlmError};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Adapter for OpenAI-compatible chat-completions endpoints. Temperature is
/// pinned low for consistent analysis; the model name travels with each
/// request rather than living in the adapter.
pub struct ChatEndpoint {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl ChatEndpoint {
    /// Fails before any network attempt when credentials or the endpoint
    /// URL are missing.
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key()
            .context("API key not found. Set LLM_API_KEY environment variable.")?;
        let base_url = config
            .base_url()
            .context("Base URL not found. Set LLM_BASE_URL environment variable.")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.llm.temperature,
        })
    }

    /// Accept both the structured chat-completions shape and a bare JSON
    /// string body; anything else is a protocol error.
    fn extract_completion(body: Value) -> Result<String, LlmError> {
        if let Value::String(text) = body {
            return Ok(text);
        }

        body.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                LlmError::Protocol("response carries no completion text".to_string())
            })
    }
}

#[async_trait]
impl LlmClient for ChatEndpoint {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        debug!(model, "Sending completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| LlmError::Protocol(err.to_string()))?;

        Ok(Self::extract_completion(body)?)
    }
}
