use crate::errors::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub mod fake;
pub mod openai;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub total_tokens: Option<i64>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
    fn model(&self) -> &str;
}

/// LLM provider used by the judge feedbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    Huggingface,
    Fake,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::AzureOpenAi => "azure_openai",
            LlmProvider::Huggingface => "huggingface",
            LlmProvider::Fake => "fake",
        }
    }

    fn default_model(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("gpt-4o-mini"),
            // Azure needs an explicit deployment name.
            LlmProvider::AzureOpenAi => None,
            LlmProvider::Huggingface => Some("meta-llama/Llama-3.1-8B-Instruct"),
            LlmProvider::Fake => Some("fake"),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "azureopenai" | "azure_openai" | "azure" => Ok(LlmProvider::AzureOpenAi),
            "huggingface" | "hf" => Ok(LlmProvider::Huggingface),
            "fake" => Ok(LlmProvider::Fake),
            other => Err(ConfigError(format!(
                "unsupported provider: {} (supported: openai, azure_openai, huggingface, fake)",
                other
            ))),
        }
    }
}

/// Builds the client for `provider`, reading credentials from the environment.
pub fn build_client(
    provider: LlmProvider,
    model: Option<&str>,
) -> Result<Arc<dyn LlmClient>, ConfigError> {
    let model = match model.or(provider.default_model()) {
        Some(m) => m.to_string(),
        None => {
            return Err(ConfigError(format!(
                "provider {} requires a model (deployment) name",
                provider
            )))
        }
    };

    let client: Arc<dyn LlmClient> = match provider {
        LlmProvider::OpenAi => {
            let api_key = require_env("OPENAI_API_KEY")?;
            let base = std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
            Arc::new(openai::OpenAIClient::new(
                provider,
                format!("{}/chat/completions", base.trim_end_matches('/')),
                openai::Auth::Bearer(api_key),
                model,
            ))
        }
        LlmProvider::AzureOpenAi => {
            let api_key = require_env("AZURE_OPENAI_API_KEY")?;
            let endpoint = require_env("AZURE_OPENAI_ENDPOINT")?;
            let version = std::env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|_| "2024-02-01".to_string());
            let url = format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                model,
                version
            );
            Arc::new(openai::OpenAIClient::new(
                provider,
                url,
                openai::Auth::ApiKey(api_key),
                model,
            ))
        }
        LlmProvider::Huggingface => {
            let token = require_env("HF_TOKEN")?;
            Arc::new(openai::OpenAIClient::new(
                provider,
                "https://router.huggingface.co/v1/chat/completions".to_string(),
                openai::Auth::Bearer(token),
                model,
            ))
        }
        LlmProvider::Fake => Arc::new(fake::FakeClient::new(model)),
    };
    Ok(client)
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError(format!("environment variable {} is not set", key)))
}
