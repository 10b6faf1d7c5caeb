//! Single-utterance speech recognition.

use uuid::Uuid;

use crate::error::SpeechError;
use crate::events::SpeechEventSink;

/// Settings passed to the host recognizer on every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub language: String,
    /// Keep listening after the first result.
    pub continuous: bool,
    /// Report partial transcripts.
    pub interim_results: bool,
}

impl RecognitionSettings {
    /// One final result per start, in `language`.
    pub fn single_utterance(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            continuous: false,
            interim_results: false,
        }
    }
}

/// A host speech recognizer.
///
/// After `start`, the engine reports through `sink`, tagging every event with
/// `session`: usually `ListeningStarted`, then at most one `Utterance` or an
/// `Error`, then `Ended`.
pub trait RecognitionEngine: Send {
    fn start(
        &mut self,
        session: Uuid,
        settings: &RecognitionSettings,
        sink: SpeechEventSink,
    ) -> Result<(), SpeechError>;

    /// Finish listening; a pending result may still be delivered.
    fn stop(&mut self);

    /// Drop the session without delivering a result.
    fn abort(&mut self);
}

/// Conversation-facing wrapper around an optional host recognizer.
pub struct SpeechInput {
    engine: Option<Box<dyn RecognitionEngine>>,
    settings: RecognitionSettings,
    sink: SpeechEventSink,
    /// Session started and not yet ended or aborted.
    current: Option<Uuid>,
}

impl std::fmt::Debug for SpeechInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechInput")
            .field("supported", &self.engine.is_some())
            .field("settings", &self.settings)
            .field("current", &self.current)
            .finish()
    }
}

impl SpeechInput {
    /// `engine` is `None` on hosts without a recognizer.
    pub fn new(
        engine: Option<Box<dyn RecognitionEngine>>,
        language: &str,
        sink: SpeechEventSink,
    ) -> Self {
        Self {
            engine,
            settings: RecognitionSettings::single_utterance(language),
            sink,
            current: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    /// Whether `session` is the live recognition session.
    pub fn is_current(&self, session: Uuid) -> bool {
        self.current == Some(session)
    }

    /// Start a new session and return its id.
    pub fn start(&mut self) -> Result<Uuid, SpeechError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or(SpeechError::Unsupported("speech recognition"))?;
        let session = Uuid::new_v4();
        engine.start(session, &self.settings, self.sink.clone())?;
        self.current = Some(session);
        tracing::debug!(session = %session, language = %self.settings.language, "Recognition started");
        Ok(session)
    }

    pub fn stop(&mut self) {
        if let (Some(engine), Some(session)) = (self.engine.as_mut(), self.current) {
            engine.stop();
            tracing::debug!(session = %session, "Recognition stop requested");
        }
    }

    /// Abort the live session. Its late events no longer count as current.
    pub fn abort(&mut self) {
        if let (Some(engine), Some(session)) = (self.engine.as_mut(), self.current) {
            engine.abort();
            tracing::debug!(session = %session, "Recognition aborted");
        }
        self.current = None;
    }

    /// Record that the engine reported the end of `session`.
    pub fn mark_ended(&mut self, session: Uuid) {
        if self.is_current(session) {
            self.current = None;
        }
    }
}

/// Trim a final transcript; blank results count as no result.
pub fn normalize_transcript(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
