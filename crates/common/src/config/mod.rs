//! Configuration management for Sahay services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! The generative backend credential may also be supplied through
//! `GOOGLE_API_KEY`, which is what a `.env` file usually carries.

use crate::errors::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fallback environment variable for the backend credential
pub const API_KEY_ENV_FALLBACK: &str = "GOOGLE_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Generative backend configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Negotiation simulator configuration
    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted PDF upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Backend provider: gemini, openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the backend
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// HTTP timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Idle time after which a session is discarded
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often idle sessions are swept
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Maximum number of live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NegotiationConfig {
    /// Role the backend plays in the negotiation simulator
    #[serde(default = "default_counterparty")]
    pub counterparty: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_enabled")]
    pub metrics_enabled: bool,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_llm_provider() -> String { "gemini".to_string() }
fn default_llm_model() -> String { "gemini-1.5-flash".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_idle_timeout() -> u64 { 1800 }
fn default_sweep_interval() -> u64 { 60 }
fn default_max_sessions() -> usize { 1000 }
fn default_counterparty() -> String { "landlord".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "sahay".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            counterparty: default_counterparty(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_enabled: default_enabled(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=gemini-1.5-pro
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_key_fallback(std::env::var(API_KEY_ENV_FALLBACK).ok());
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = config.try_deserialize()?;
        config.apply_key_fallback(std::env::var(API_KEY_ENV_FALLBACK).ok());
        Ok(config)
    }

    /// Fill in the backend credential when no explicit key was configured
    pub fn apply_key_fallback(&mut self, fallback: Option<String>) {
        let missing = self
            .llm
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty());

        if missing {
            self.llm.api_key = fallback.filter(|key| !key.trim().is_empty());
        }
    }

    /// Check settings that would otherwise only fail on first use
    pub fn validate(&self) -> Result<(), AppError> {
        match self.llm.provider.as_str() {
            "mock" => {}
            "gemini" | "openai" => {
                if self.llm.api_key.is_none() {
                    return Err(AppError::Configuration {
                        message: format!(
                            "no API key for provider '{}': set APP__LLM__API_KEY or {}",
                            self.llm.provider, API_KEY_ENV_FALLBACK
                        ),
                    });
                }
            }
            other => {
                return Err(AppError::Configuration {
                    message: format!("unknown llm provider '{}'", other),
                });
            }
        }

        if self.server.max_upload_bytes == 0 {
            return Err(AppError::Configuration {
                message: "server.max_upload_bytes must be greater than zero".to_string(),
            });
        }

        if self.negotiation.counterparty.trim().is_empty() {
            return Err(AppError::Configuration {
                message: "negotiation.counterparty must not be blank".to_string(),
            });
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get idle session timeout as Duration
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.negotiation.counterparty, "landlord");
    }

    #[test]
    fn test_missing_key_fails_fast() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
        assert!(err.to_string().contains(API_KEY_ENV_FALLBACK));
    }

    #[test]
    fn test_mock_provider_needs_no_key() {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_fallback() {
        let mut config = AppConfig::default();
        config.apply_key_fallback(Some("from-env".to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("from-env"));
        assert!(config.validate().is_ok());

        // Explicit key wins over the fallback
        config.apply_key_fallback(Some("other".to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_blank_fallback_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_key_fallback(Some("   ".to_string()));
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = AppConfig::default();
        config.llm.provider = "carrier-pigeon".to_string();
        config.llm.api_key = Some("key".to_string());
        assert!(config.validate().is_err());
    }
}
