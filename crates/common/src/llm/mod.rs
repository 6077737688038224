//! Generative backend abstraction
//!
//! Provides a unified interface over hosted text-generation APIs:
//! - Google Gemini (`generateContent`)
//! - OpenAI-compatible chat completions
//! - A scripted mock for development and tests

mod gemini;
mod mock;
mod openai;

pub use gemini::GeminiBackend;
pub use mock::{BackendCall, MockBackend};
pub use openai::OpenAiBackend;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::session::Turn;
use async_trait::async_trait;
use std::sync::Arc;

/// Longest upstream error body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Trait for text generation
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Single-shot generation from one prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Multi-turn generation; `turns` ends with the newest user turn
    async fn chat(&self, turns: &[Turn]) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create a backend based on configuration
pub fn create_backend(config: &LlmConfig) -> Result<Arc<dyn GenerativeBackend>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiBackend::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiBackend::new(config)?)),
        "mock" => {
            tracing::warn!("Using mock generative backend; responses are canned");
            Ok(Arc::new(MockBackend::new()))
        }
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider '{}'", other),
        }),
    }
}

/// Build the shared HTTP client for a connector
pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

pub(crate) fn require_api_key(config: &LlmConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| AppError::Configuration {
            message: format!("provider '{}' requires an API key", config.provider),
        })
}

/// Classify a transport failure
pub(crate) fn transport_error(err: reqwest::Error, timeout_secs: u64) -> AppError {
    if err.is_timeout() {
        AppError::BackendTimeout { timeout_secs }
    } else {
        AppError::Backend {
            message: format!("request failed: {}", err),
        }
    }
}

/// Turn a non-success HTTP status into the matching backend error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AppError::BackendRateLimited);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::BackendStatus {
        status: status.as_u16(),
        body: truncate(&body, MAX_ERROR_BODY),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
