//! Conversation status machine.
//!
//! Valid transitions:
//! - Idle -> Listening (microphone armed)
//! - Idle | Listening -> Thinking (message submitted)
//! - Thinking | Speaking -> Thinking (message submitted over a running turn)
//! - Thinking -> Speaking (reply handed to synthesis)
//! - Listening | Thinking | Speaking -> Idle (turn settled)
//!
//! Personality changes and going back use [`StatusMachine::reset`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// What the conversation is doing right now.
///
/// At most one of recognition, a remote request or synthesis is in progress,
/// and the status says which.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStatus {
    /// Nothing in flight.
    #[default]
    Idle,
    /// The recognizer is capturing one utterance.
    Listening,
    /// Waiting for or receiving the streamed reply.
    Thinking,
    /// The reply is being spoken.
    Speaking,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Idle => write!(f, "Idle"),
            ConversationStatus::Listening => write!(f, "Listening"),
            ConversationStatus::Thinking => write!(f, "Thinking"),
            ConversationStatus::Speaking => write!(f, "Speaking"),
        }
    }
}

impl ConversationStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &ConversationStatus) -> bool {
        use ConversationStatus::*;
        matches!(
            (self, target),
            (Idle, Listening)
                | (Idle, Thinking)
                | (Listening, Thinking)
                | (Thinking, Thinking)
                | (Speaking, Thinking)
                | (Thinking, Speaking)
                | (Listening, Idle)
                | (Thinking, Idle)
                | (Speaking, Idle)
        )
    }
}

/// Owned status with validated transitions.
#[derive(Debug, Clone, Default)]
pub struct StatusMachine {
    state: ConversationStatus,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> ConversationStatus {
        self.state
    }

    /// Move to `target`, refusing transitions the table does not allow.
    pub fn transition(&mut self, target: ConversationStatus) -> Result<(), ChatError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!(from = %self.state, to = %target, "Conversation status");
            self.state = target;
            Ok(())
        } else {
            Err(ChatError::IllegalTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Force the status back to Idle.
    pub fn reset(&mut self) {
        if self.state != ConversationStatus::Idle {
            tracing::debug!(from = %self.state, "Conversation status reset to Idle");
        }
        self.state = ConversationStatus::Idle;
    }
}
