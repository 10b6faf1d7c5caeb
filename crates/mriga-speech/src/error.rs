//! Error types for speech input and output.

use mriga_core::error::MrigaError;

/// Errors from the host speech engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("{0} is not supported on this host")]
    Unsupported(&'static str),
    #[error("recognition error: {0}")]
    Recognition(String),
    #[error("synthesis error: {0}")]
    Synthesis(String),
}

impl From<SpeechError> for MrigaError {
    fn from(err: SpeechError) -> Self {
        MrigaError::Speech(err.to_string())
    }
}
