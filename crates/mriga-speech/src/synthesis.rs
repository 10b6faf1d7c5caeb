//! Text-to-speech output.

use uuid::Uuid;

use mriga_core::types::VoiceGender;

use crate::error::SpeechError;
use crate::events::SpeechEventSink;
use crate::voice::{HostVoice, VoiceCatalog};

/// One playback request handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    /// `None` lets the host pick its default voice.
    pub voice: Option<HostVoice>,
    pub language: Option<String>,
}

/// A host text-to-speech engine.
///
/// `speak` returns once playback is queued; `Started`, then `Ended` or
/// `Error`, follow through the sink tagged with the utterance id.
pub trait SynthesisEngine: Send {
    fn voices(&self) -> Vec<HostVoice>;

    fn speak(&mut self, utterance: Utterance, sink: SpeechEventSink) -> Result<(), SpeechError>;

    /// Stop any queued or playing utterance.
    fn cancel(&mut self);
}

/// Conversation-facing wrapper around an optional host synthesizer.
pub struct SpeechOutput {
    engine: Option<Box<dyn SynthesisEngine>>,
    catalog: VoiceCatalog,
    sink: SpeechEventSink,
    current: Option<Uuid>,
}

impl std::fmt::Debug for SpeechOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutput")
            .field("supported", &self.engine.is_some())
            .field("catalog", &self.catalog)
            .field("current", &self.current)
            .finish()
    }
}

impl SpeechOutput {
    /// Creates the adapter and reads the host voice list once.
    pub fn new(engine: Option<Box<dyn SynthesisEngine>>, language: &str, sink: SpeechEventSink) -> Self {
        let mut output = Self {
            engine,
            catalog: VoiceCatalog::new(language),
            sink,
            current: None,
        };
        output.refresh_voices();
        output
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Id of the utterance that is queued or playing, if any.
    pub fn current(&self) -> Option<Uuid> {
        self.current
    }

    pub fn is_current(&self, utterance: Uuid) -> bool {
        self.current == Some(utterance)
    }

    /// Re-read the host voice list into the selection cache.
    pub fn refresh_voices(&mut self) {
        if let Some(engine) = self.engine.as_ref() {
            let voices = engine.voices();
            self.catalog.refresh(&voices);
        }
    }

    /// Speak `text`, replacing whatever was playing.
    pub fn speak(&mut self, text: &str, gender: Option<VoiceGender>) -> Result<Uuid, SpeechError> {
        self.cancel();
        let voice = self.catalog.select(gender).cloned();
        let language = voice.as_ref().map(|_| self.catalog.language().to_string());
        let engine = self
            .engine
            .as_mut()
            .ok_or(SpeechError::Unsupported("speech synthesis"))?;

        let utterance = Utterance {
            id: Uuid::new_v4(),
            text: text.to_string(),
            voice,
            language,
        };
        let id = utterance.id;
        tracing::debug!(
            utterance_id = %id,
            voice = utterance.voice.as_ref().map(|v| v.name.as_str()).unwrap_or("default"),
            chars = text.len(),
            "Speaking"
        );
        engine.speak(utterance, self.sink.clone())?;
        self.current = Some(id);
        Ok(id)
    }

    pub fn cancel(&mut self) {
        if let Some(id) = self.current.take() {
            if let Some(engine) = self.engine.as_mut() {
                engine.cancel();
            }
            tracing::debug!(utterance_id = %id, "Synthesis cancelled");
        }
    }

    /// Forget `utterance` once the host reports it finished.
    pub fn finish(&mut self, utterance: Uuid) {
        if self.is_current(utterance) {
            self.current = None;
        }
    }
}
