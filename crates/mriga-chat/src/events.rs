//! Inputs consumed by the conversation engine.

use mriga_core::types::InteractionMode;
use mriga_llm::LlmError;
use mriga_speech::SpeechEvent;

use crate::personality::PersonaDraft;

/// Something the user asked for through the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    SelectMode(InteractionMode),
    SelectPersonality(String),
    AddPersonality { draft: PersonaDraft, secret_code: String },
    SendText(String),
    ToggleMic,
    GoBack,
}

/// Everything the engine reacts to, in arrival order.
///
/// Stream events carry the turn id of the send that produced them so that
/// events from a superseded turn can be dropped.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Intent(UserIntent),
    StreamChunk { turn: u64, text: String },
    StreamEnded { turn: u64 },
    StreamFailed { turn: u64, error: LlmError },
    Speech(SpeechEvent),
    Shutdown,
}

impl From<UserIntent> for ConversationEvent {
    fn from(intent: UserIntent) -> Self {
        ConversationEvent::Intent(intent)
    }
}

impl From<SpeechEvent> for ConversationEvent {
    fn from(event: SpeechEvent) -> Self {
        ConversationEvent::Speech(event)
    }
}
