//! Error types for the conversation engine.

use mriga_core::error::MrigaError;
use mriga_llm::LlmError;
use mriga_speech::SpeechError;

use crate::state::ConversationStatus;

/// Errors from the conversation engine and personality registry.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid personality: {0}")]
    Validation(String),
    #[error("unknown personality '{0}'")]
    UnknownPersonality(String),
    #[error("Incorrect secret code. Access denied.")]
    Authorization,
    #[error("no active chat session")]
    NoSession,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: ConversationStatus,
        to: ConversationStatus,
    },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Speech(#[from] SpeechError),
}

impl From<ChatError> for MrigaError {
    fn from(err: ChatError) -> Self {
        MrigaError::Conversation(err.to_string())
    }
}
