//! OpenAI-compatible assistant implementation.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use nexus_core::defaults;
use nexus_core::{AiAssistant, Analysis, Error, Result};

use super::error::ApiFailure;
use super::types::*;
use crate::prompts;

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = "gpt-3.5-turbo";

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for the OpenAI-compatible assistant.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key. Without it every call fails with `ConfigMissing`.
    pub api_key: Option<String>,
    /// Chat model used for both analysis and generation.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    pub temperature: f32,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            model: DEFAULT_GEN_MODEL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            temperature: defaults::AI_TEMPERATURE,
        }
    }
}

impl AssistantConfig {
    /// Read `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_GEN_MODEL` and
    /// `OPENAI_TIMEOUT`. A blank key counts as absent.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("OPENAI_GEN_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string()),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            temperature: defaults::AI_TEMPERATURE,
        }
    }
}

/// Chat-completions assistant.
pub struct OpenAIAssistant {
    client: Client,
    config: AssistantConfig,
}

impl OpenAIAssistant {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing OpenAI assistant: url={}, model={}, key={}",
            config.base_url,
            config.model,
            if config.api_key.is_some() { "set" } else { "unset" }
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AssistantConfig::from_env())
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Send one system + user exchange and return the first choice's text.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::ConfigMissing("OPENAI_API_KEY".to_string()))?;

        debug!(
            "Completing with model {}, input length: {}",
            self.config.model,
            user.len()
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(max_tokens),
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Assistant(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let (message, error_type) = match response.json::<OpenAIErrorResponse>().await {
                Ok(body) => (body.error.message, body.error.code.unwrap_or(body.error.error_type)),
                Err(_) => ("Unknown error".to_string(), "unknown".to_string()),
            };
            let failure = ApiFailure::classify(status.as_u16(), &error_type);
            warn!(%status, ?failure, "Assistant request rejected");
            return Err(failure.into_error(&message));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Assistant(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Assistant("response contained no choices".to_string()))?;

        debug!("Completion finished, response length: {}", content.len());
        Ok(content)
    }
}

#[async_trait]
impl AiAssistant for OpenAIAssistant {
    async fn analyze(&self, content: &str) -> Result<Analysis> {
        let raw = self
            .complete(
                &prompts::analyze_system_prompt(),
                content,
                defaults::AI_ANALYZE_MAX_TOKENS,
            )
            .await?;
        prompts::parse_analysis(&raw)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(
            prompts::GENERATE_SYSTEM_PROMPT,
            prompt,
            defaults::AI_GENERATE_MAX_TOKENS,
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
