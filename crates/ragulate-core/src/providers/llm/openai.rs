use super::{LlmClient, LlmProvider, LlmResponse};
use async_trait::async_trait;
use serde_json::json;

/// How the endpoint expects credentials.
#[derive(Debug, Clone)]
pub enum Auth {
    Bearer(String),
    /// Azure-style `api-key` header.
    ApiKey(String),
}

/// Client for any OpenAI-compatible chat completions endpoint
/// (OpenAI, Azure OpenAI deployments, the Hugging Face router).
pub struct OpenAIClient {
    pub provider: LlmProvider,
    pub url: String,
    pub auth: Auth,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(provider: LlmProvider, url: String, auth: Auth, model: String) -> Self {
        Self {
            provider,
            url,
            auth,
            model,
            temperature: 0.0,
            max_tokens: 512,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<LlmResponse> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        let req = match &self.auth {
            Auth::Bearer(key) => req.header("Authorization", format!("Bearer {}", key)),
            Auth::ApiKey(key) => req.header("api-key", key),
        };

        let resp = req.json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} chat API error ({}): {}", self.provider, status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("{} API response missing content", self.provider))?
            .to_string();
        let total_tokens = json.pointer("/usage/total_tokens").and_then(|v| v.as_i64());

        Ok(LlmResponse {
            text,
            provider: self.provider.to_string(),
            model: self.model.clone(),
            total_tokens,
        })
    }

    fn provider_name(&self) -> &'static str {
        self.provider.as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }
}
