//! Request-level error taxonomy

use thiserror::Error;

/// Body used when even the error response cannot be rendered
pub const CATCH_ALL_ERROR_BODY: &str = r#"{"error":"An internal server error occurred"}"#;

/// Client-side problems with the inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Input text is missing or empty.")]
    EmptyInput,
    #[error("Invalid JSON in request body.")]
    MalformedBody,
}

/// Everything that can end a request without a successful completion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("All models failed. Last error: {0}")]
    Exhausted(String),
    #[error("An internal server error occurred: {0}")]
    Internal(String),
}

impl HandlerError {
    /// HTTP-style status reported to the caller
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Exhausted(_) | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(HandlerError::from(ValidationError::EmptyInput).status_code(), 400);
        assert_eq!(HandlerError::from(ValidationError::MalformedBody).status_code(), 400);
        assert_eq!(HandlerError::Exhausted("x".into()).status_code(), 500);
        assert_eq!(HandlerError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            HandlerError::Exhausted("Model m2 returned an empty response.".into()).to_string(),
            "All models failed. Last error: Model m2 returned an empty response."
        );
        assert_eq!(
            HandlerError::from(ValidationError::EmptyInput).to_string(),
            "Input text is missing or empty."
        );
    }

    #[test]
    fn test_catch_all_body_is_json() {
        let v: serde_json::Value = serde_json::from_str(CATCH_ALL_ERROR_BODY).unwrap();
        assert_eq!(v["error"], "An internal server error occurred");
    }
}
