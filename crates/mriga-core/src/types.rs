use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Voice gender hint attached to a personality.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    /// Male voice (also the fallback when no hint is given).
    #[default]
    Male,
    /// Female voice.
    Female,
}

impl VoiceGender {
    /// The other gender, used when the requested voice is unavailable.
    pub fn opposite(self) -> Self {
        match self {
            VoiceGender::Male => VoiceGender::Female,
            VoiceGender::Female => VoiceGender::Male,
        }
    }
}

impl fmt::Display for VoiceGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceGender::Male => write!(f, "male"),
            VoiceGender::Female => write!(f, "female"),
        }
    }
}

/// Tag reported by the host for a synthesis voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTag {
    Male,
    Female,
    /// Vendor-flagged high quality voice (e.g. Google network voices).
    HighQuality,
}

impl From<VoiceGender> for VoiceTag {
    fn from(gender: VoiceGender) -> Self {
        match gender {
            VoiceGender::Male => VoiceTag::Male,
            VoiceGender::Female => VoiceTag::Female,
        }
    }
}

/// Author of a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// How the user interacts with the conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// No conversation mode chosen yet (landing screen).
    #[default]
    Landing,
    /// Microphone in, synthesized speech out.
    Voice,
    /// Typed messages in, text out.
    Text,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Landing => write!(f, "landing"),
            InteractionMode::Voice => write!(f, "voice"),
            InteractionMode::Text => write!(f, "text"),
        }
    }
}

// =============================================================================
// Structs
// =============================================================================

/// A named system-prompt preset that shapes the model's persona.
///
/// Immutable once created: the registry only ever prepends new entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personality {
    /// Display name, also the selection key.
    pub name: String,
    /// Instruction text sent once when a session is created.
    pub system_prompt: String,
    /// Preferred synthesis voice gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<VoiceGender>,
}

impl Personality {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        gender: Option<VoiceGender>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            gender,
        }
    }
}

/// One entry of the conversation transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}
