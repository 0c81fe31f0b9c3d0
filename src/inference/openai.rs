//! OpenAI-compatible chat-completions backend.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::core::config::InferenceConfig;
use crate::core::error::{ProtocolError, ProtocolResult};
use crate::inference::InferenceService;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Inference backend speaking the OpenAI chat-completions API
pub struct OpenAiInference {
    api_key: String,
    model: String,
    api_base: String,
    temperature: f32,
    client: Client,
}

impl OpenAiInference {
    pub fn new(config: &InferenceConfig) -> ProtocolResult<Self> {
        if config.api_key.is_empty() {
            return Err(ProtocolError::ConfigError(
                "openai provider requires an api_key".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base,
            temperature: config.temperature,
            client,
        })
    }
}

#[async_trait]
impl InferenceService for OpenAiInference {
    async fn complete(&self, prompt: &str, max_tokens: usize) -> ProtocolResult<String> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });

        debug!("Sending completion request to {} ({})", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProtocolError::InferenceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProtocolError::InferenceUnavailable(format!(
                "API returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProtocolError::InferenceUnavailable(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProtocolError::InferenceUnavailable("response contained no completion".to_string())
            })
    }
}
