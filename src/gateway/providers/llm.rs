//! LLM completion provider — the engine behind every agent role's "thinking".

use crate::gateway::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError>;
}

/// Calls an OpenAI-compatible chat-completions endpoint. Gated on
/// `LLM_API_KEY`; absent credential yields `Unavailable` at construction.
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Upstream(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(GatewayError::Upstream(format!("llm provider returned {}", resp.status())));
        }

        let value: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| GatewayError::Upstream("missing choices[0].message.content".to_string()))
    }
}

/// Always-unavailable fallback used when `LLM_API_KEY` is absent.
pub struct UnavailableLlmProvider;

#[async_trait]
impl LlmProvider for UnavailableLlmProvider {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, GatewayError> {
        Err(GatewayError::Unavailable("LLM_API_KEY not configured".to_string()))
    }
}
