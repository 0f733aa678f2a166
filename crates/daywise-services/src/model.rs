//! Generative model client (OpenAI-compatible chat completions).

use std::time::Duration;

use async_trait::async_trait;
use daywise_core::{ModelConfig, NetworkError, ReqwestErrorExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

/// Sampling used for every schedule request. Kept low so the same schedule
/// and disruption give near-identical answers.
pub const TEMPERATURE: f32 = 0.1;
pub const TOP_P: f32 = 0.1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No model API key configured")]
    MissingApiKey,

    #[error("Model API rejected the credentials")]
    Unauthorized,

    #[error("Model API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Model returned no content")]
    EmptyResponse,

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl ModelError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "No model API key is configured. Check your settings.",
            Self::Unauthorized => "The model service rejected the API key.",
            Self::Api { status, .. } if *status >= 500 => {
                "The model service is experiencing issues. Please try again later."
            }
            Self::Api { .. } => "The model service refused the request.",
            Self::EmptyResponse => "The model returned an empty answer. Please try again.",
            Self::Network(e) => e.user_message(),
        }
    }
}

/// A text generator that answers one instruction with free text.
#[async_trait]
pub trait ScheduleModel: Send + Sync {
    async fn complete(&self, instruction: &str) -> Result<String, ModelError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

/// Client for any server exposing `{base_url}/chat/completions`.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Network(e.into_network_error()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ScheduleModel for ChatCompletionClient {
    #[instrument(skip_all, fields(model = %self.model), level = "info")]
    async fn complete(&self, instruction: &str) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: instruction,
            }],
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.into_network_error()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ModelError::Unauthorized);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Network(e.into_network_error()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ModelError::EmptyResponse)?;

        tracing::debug!(chars = content.len(), "Model answered");
        Ok(content)
    }
}
