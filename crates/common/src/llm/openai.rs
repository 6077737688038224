//! OpenAI-compatible chat completions connector

use super::{check_status, http_client, require_api_key, transport_error, GenerativeBackend};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::session::{Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions client
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiBackend {
    /// Create a new chat completions client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            api_key: require_api_key(config)?,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: config.timeout_secs,
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        })
    }

    async fn send(&self, messages: Vec<ChatMessage<'_>>) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let response = check_status(response).await?;

        let chat_response: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| AppError::MalformedResponse {
                    message: format!("Failed to parse chat completion: {}", e),
                })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| AppError::MalformedResponse {
                message: "chat completion has no choices".to_string(),
            })
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Persona => "system",
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    #[tracing::instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.send(vec![ChatMessage {
            role: "user",
            content: prompt,
        }])
        .await
    }

    #[tracing::instrument(skip_all, fields(model = %self.model, turns = turns.len()))]
    async fn chat(&self, turns: &[Turn]) -> Result<String> {
        let messages = turns
            .iter()
            .map(|turn| ChatMessage {
                role: wire_role(turn.role),
                content: &turn.text,
            })
            .collect();

        self.send(messages).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
