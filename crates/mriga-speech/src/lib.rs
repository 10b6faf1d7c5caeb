//! Speech input and output adapters for the Mriga client.
//!
//! Host engines (microphone recognizer, text-to-speech) sit behind the
//! [`RecognitionEngine`] and [`SynthesisEngine`] traits and report back
//! through a [`SpeechEventSink`]. The adapters here add the conversation
//! rules on top: single-utterance recognition and cancel-before-speak output
//! with gender-aware voice selection.

pub mod error;
pub mod events;
pub mod recognition;
pub mod synthesis;
pub mod voice;

pub use error::SpeechError;
pub use events::{RecognitionEvent, SpeechEvent, SpeechEventSink, SynthesisEvent};
pub use recognition::{RecognitionEngine, RecognitionSettings, SpeechInput};
pub use synthesis::{SpeechOutput, SynthesisEngine, Utterance};
pub use voice::{HostVoice, VoiceCatalog};
