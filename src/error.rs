//! Error types for the bookkeeping assistant runtime

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Tool Boundary Errors
    // =============================

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Invariant violation: {0}")]
    InvariantError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Limit reached: {0}")]
    LimitError(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    // =============================
    // Scheduler & Store Errors
    // =============================

    #[error("Model provider error: {0}")]
    ProviderError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Stable tag embedded in structured tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ValidationError(_) => "validation",
            AgentError::ResolutionError(_) => "resolution",
            AgentError::InvariantError(_) => "invariant",
            AgentError::TimeoutError(_) => "timeout",
            AgentError::LimitError(_) => "limit",
            AgentError::UpstreamError(_) => "upstream",
            AgentError::ProviderError(_) => "upstream",
            AgentError::DatabaseError(_) => "upstream",
            AgentError::SerializationError(_) => "validation",
            AgentError::UuidError(_) => "validation",
            AgentError::HttpError(_) => "upstream",
            AgentError::IoError(_) => "upstream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AgentError::ValidationError("bad input".into()).kind(),
            "validation"
        );
        assert_eq!(AgentError::TimeoutError("slow".into()).kind(), "timeout");
        assert_eq!(
            AgentError::DatabaseError("connection refused".into()).kind(),
            "upstream"
        );
    }

    #[test]
    fn test_error_display_includes_detail() {
        let error = AgentError::InvariantError("debits 100.00 vs credits 99.00".into());
        assert!(error.to_string().contains("100.00"));
    }
}
