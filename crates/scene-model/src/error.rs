//! Model parsing and validation errors.

/// Errors that can occur when reading or validating render input.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Parse error: {source}")]
    ParseError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid request: {message}")]
    ValidationError { message: String },

    #[error("Unknown element type '{kind}' (element {id})")]
    UnknownElementType { id: String, kind: String },
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError {
            message: msg.into(),
        }
    }
}
