//! Conversation orchestration for the Mriga client.
//!
//! Ties together the personality registry, the remote chat session and the
//! speech adapters behind a single event-driven state machine.

pub mod engine;
pub mod error;
pub mod events;
pub mod personality;
pub mod state;
pub mod transcript;

pub use engine::{ConversationEngine, ConversationHandle, ConversationSnapshot, SpeechEngines, ERROR_MESSAGE};
pub use error::ChatError;
pub use events::{ConversationEvent, UserIntent};
pub use personality::{PersonaDraft, PersonalityRegistry};
pub use state::{ConversationStatus, StatusMachine};
pub use transcript::Transcript;
