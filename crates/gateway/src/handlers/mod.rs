//! API handlers module

pub mod artifacts;
pub mod chat;
pub mod documents;
pub mod health;
pub mod sessions;

use sahay_common::errors::{AppError, Result};
use serde::Deserialize;
use validator::Validate;

/// Longest text accepted in a JSON request body
pub const MAX_TEXT_CHARS: u64 = 20_000;

/// Body shared by every endpoint that takes free text
#[derive(Debug, Deserialize, Validate)]
pub struct TextRequest {
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub text: String,
}

impl TextRequest {
    /// Check the length limit; blank text is left to the session engine
    pub fn validated(self) -> Result<String> {
        self.validate().map_err(|e| AppError::Validation {
            message: format!("text exceeds {} characters: {}", MAX_TEXT_CHARS, e),
            field: Some("text".to_string()),
        })?;
        Ok(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_request_length_limit() {
        let request = TextRequest {
            text: "a".repeat(MAX_TEXT_CHARS as usize + 1),
        };
        assert!(matches!(
            request.validated(),
            Err(AppError::Validation { .. })
        ));

        let request = TextRequest {
            text: "   ".to_string(),
        };
        assert_eq!(request.validated().unwrap(), "   ");
    }
}
