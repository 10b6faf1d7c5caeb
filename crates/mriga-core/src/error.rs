use thiserror::Error;

/// Top-level error type for the Mriga client.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for MrigaError` so that the `?` operator works
/// across crate boundaries up to the binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MrigaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Chat backend error: {0}")]
    Llm(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("Conversation error: {0}")]
    Conversation(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for MrigaError {
    fn from(err: toml::de::Error) -> Self {
        MrigaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for MrigaError {
    fn from(err: toml::ser::Error) -> Self {
        MrigaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MrigaError {
    fn from(err: serde_json::Error) -> Self {
        MrigaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Mriga operations.
pub type Result<T> = std::result::Result<T, MrigaError>;
