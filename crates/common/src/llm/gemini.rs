//! Google Gemini connector (`models/{model}:generateContent`)

use super::{check_status, http_client, require_api_key, transport_error, GenerativeBackend};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::session::{Role, Turn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini client
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiBackend {
    /// Create a new Gemini client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let generation_config = if config.temperature.is_some() || config.max_output_tokens.is_some() {
            Some(GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            })
        } else {
            None
        };

        Ok(Self {
            client: http_client(config)?,
            api_key: require_api_key(config)?,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: config.timeout_secs,
            generation_config,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn send(&self, contents: Vec<Content<'_>>) -> Result<String> {
        let request = GenerateRequest {
            contents,
            generation_config: self.generation_config.as_ref(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let response = check_status(response).await?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse {
                message: format!("Failed to parse Gemini response: {}", e),
            }
        })?;

        response_text(body)
    }
}

/// Gemini only knows "user" and "model"; the persona travels as a user turn
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Persona => "user",
        Role::Assistant => "model",
    }
}

/// Map stored turns onto Gemini's `contents` array
fn contents(turns: &[Turn]) -> Vec<Content<'_>> {
    turns
        .iter()
        .map(|turn| Content {
            role: wire_role(turn.role),
            parts: vec![Part { text: &turn.text }],
        })
        .collect()
}

fn response_text(body: GenerateResponse) -> Result<String> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AppError::ContentBlocked { reason });
    }

    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::MalformedResponse {
            message: "Gemini response has no candidates".to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r == "SAFETY" || r == "BLOCKLIST") {
            return Err(AppError::ContentBlocked { reason });
        }
    }

    Ok(text)
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    #[tracing::instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.send(vec![Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        }])
        .await
    }

    #[tracing::instrument(skip_all, fields(model = %self.model, turns = turns.len()))]
    async fn chat(&self, turns: &[Turn]) -> Result<String> {
        self.send(contents(turns)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_joins_candidate_parts() {
        let body = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Thirty "},{"text":"days."}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(response_text(body).unwrap(), "Thirty days.");
    }

    #[test]
    fn test_blocked_prompt() {
        let body = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(
            response_text(body),
            Err(AppError::ContentBlocked { .. })
        ));
    }

    #[test]
    fn test_missing_candidates_is_malformed() {
        let body = parse(r#"{"candidates":[]}"#);
        assert!(matches!(
            response_text(body),
            Err(AppError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_request_shape() {
        let turns = [
            Turn::new(Role::Persona, "You play the landlord."),
            Turn::new(Role::Assistant, "Hello!"),
            Turn::new(Role::User, "Lower the deposit."),
        ];
        let request = GenerateRequest {
            contents: contents(&turns),
            generation_config: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "Lower the deposit.");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_endpoint() {
        let config = LlmConfig {
            api_key: Some("key".to_string()),
            api_base: Some("http://localhost:9000/v1beta/".to_string()),
            ..LlmConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        assert_eq!(
            backend.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
