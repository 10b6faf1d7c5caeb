//! Error types for the remote chat backend.

use mriga_core::error::MrigaError;

/// Errors from opening or consuming a reply stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("API key not configured: set the {0} environment variable")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Whether a later retry of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Request(_) | LlmError::Stream(_) => true,
            LlmError::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            LlmError::MissingApiKey(_) | LlmError::Decode(_) => false,
        }
    }
}

impl From<LlmError> for MrigaError {
    fn from(err: LlmError) -> Self {
        MrigaError::Llm(err.to_string())
    }
}
