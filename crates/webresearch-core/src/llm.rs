//! Hosted chat-completion client used for report synthesis.

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::{SecretValue, WebResearchError};

/// Seam between the synthesizer and whichever model provider is configured.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model(&self) -> &str;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretValue,
    model: String,
    temperature: Option<f32>,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig, api_key: SecretValue) -> Result<Self, WebResearchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| WebResearchError::Llm(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionsRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending chat completion");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("chat completion HTTP {status}"));
        }

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .context("malformed chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion returned no choices"))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}
