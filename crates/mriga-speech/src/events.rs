//! Events reported by host speech engines.

use std::sync::Arc;

use uuid::Uuid;

/// Callback from the recognition engine, tagged with the session it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// The microphone is live.
    ListeningStarted { session: Uuid },
    /// A final transcript for the single utterance.
    Utterance { session: Uuid, text: String },
    /// The engine failed; the code is host-specific (`no-speech`, `network`...).
    Error { session: Uuid, code: String },
    /// The recognition session is over, with or without a result.
    Ended { session: Uuid },
}

impl RecognitionEvent {
    pub fn session(&self) -> Uuid {
        match self {
            RecognitionEvent::ListeningStarted { session }
            | RecognitionEvent::Utterance { session, .. }
            | RecognitionEvent::Error { session, .. }
            | RecognitionEvent::Ended { session } => *session,
        }
    }
}

/// Callback from the synthesis engine, tagged with the utterance it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Started { utterance: Uuid },
    Ended { utterance: Uuid },
    Error { utterance: Uuid, code: String },
}

impl SynthesisEvent {
    pub fn utterance(&self) -> Uuid {
        match self {
            SynthesisEvent::Started { utterance }
            | SynthesisEvent::Ended { utterance }
            | SynthesisEvent::Error { utterance, .. } => *utterance,
        }
    }
}

/// Anything a speech engine can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Recognition(RecognitionEvent),
    Synthesis(SynthesisEvent),
    /// The host voice list changed and should be re-read.
    VoicesChanged,
}

impl From<RecognitionEvent> for SpeechEvent {
    fn from(event: RecognitionEvent) -> Self {
        SpeechEvent::Recognition(event)
    }
}

impl From<SynthesisEvent> for SpeechEvent {
    fn from(event: SynthesisEvent) -> Self {
        SpeechEvent::Synthesis(event)
    }
}

/// Where engines deliver their events. Must not block.
pub type SpeechEventSink = Arc<dyn Fn(SpeechEvent) + Send + Sync>;
