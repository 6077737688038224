//! Sahay Common Library
//!
//! Shared code for the Sahay services including:
//! - Session engine (document state, conversations, controller)
//! - Generative backend abstraction
//! - Document model and text extraction seam
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod document;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod session;

// Re-export commonly used types
pub use config::AppConfig;
pub use document::TextExtractor;
pub use errors::{AppError, Result};
pub use llm::GenerativeBackend;
pub use session::{SessionController, SessionState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
