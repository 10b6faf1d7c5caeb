//! Conversation engine managing the whole turn lifecycle.
//!
//! The `ConversationEngine` is the only owner of status, transcript and the
//! remote session. User intents, stream fragments and speech callbacks all
//! arrive as [`ConversationEvent`]s on one channel and are applied in order;
//! the resulting state is published as a [`ConversationSnapshot`].

use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use mriga_core::config::SpeechConfig;
use mriga_core::error::{MrigaError, Result as MrigaResult};
use mriga_core::types::{ConversationMessage, InteractionMode, Personality};
use mriga_llm::{ChatClient, ChatSession, ChunkStream, LlmError};
use mriga_speech::recognition::normalize_transcript;
use mriga_speech::{
    RecognitionEngine, RecognitionEvent, SpeechEvent, SpeechEventSink, SpeechInput, SpeechOutput,
    SynthesisEngine, SynthesisEvent,
};

use crate::error::ChatError;
use crate::events::{ConversationEvent, UserIntent};
use crate::personality::{PersonaDraft, PersonalityRegistry};
use crate::state::{ConversationStatus, StatusMachine};
use crate::transcript::Transcript;

/// Shown (and spoken) in place of a reply whose stream failed.
pub const ERROR_MESSAGE: &str = "I'm having trouble connecting right now. Please try again later.";

/// Host speech engines handed to the conversation engine.
///
/// A missing engine means the host lacks that capability.
pub struct SpeechEngines {
    pub recognizer: Option<Box<dyn RecognitionEngine>>,
    pub synthesizer: Option<Box<dyn SynthesisEngine>>,
    pub recognition_language: String,
    pub synthesis_language: String,
}

impl SpeechEngines {
    /// No engines, languages taken from configuration.
    pub fn new(config: &SpeechConfig) -> Self {
        Self {
            recognizer: None,
            synthesizer: None,
            recognition_language: config.recognition_language.clone(),
            synthesis_language: config.synthesis_language.clone(),
        }
    }

    pub fn with_recognizer(mut self, engine: impl RecognitionEngine + 'static) -> Self {
        self.recognizer = Some(Box::new(engine));
        self
    }

    pub fn with_synthesizer(mut self, engine: impl SynthesisEngine + 'static) -> Self {
        self.synthesizer = Some(Box::new(engine));
        self
    }
}

impl Default for SpeechEngines {
    fn default() -> Self {
        Self::new(&SpeechConfig::default())
    }
}

/// Read-only view of the conversation for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSnapshot {
    pub mode: InteractionMode,
    pub status: ConversationStatus,
    pub transcript: Vec<ConversationMessage>,
    /// Newest first.
    pub personalities: Vec<Personality>,
    pub selected: Personality,
    pub recognition_supported: bool,
    pub synthesis_supported: bool,
    /// Last user-visible message, e.g. a rejected secret code.
    pub notice: Option<String>,
}

/// Cloneable sender of intents into a running engine.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    events: mpsc::UnboundedSender<ConversationEvent>,
    snapshots: watch::Receiver<ConversationSnapshot>,
}

impl ConversationHandle {
    pub fn send(&self, intent: UserIntent) -> MrigaResult<()> {
        self.events
            .send(ConversationEvent::Intent(intent))
            .map_err(|_| MrigaError::ShuttingDown)
    }

    pub fn send_text(&self, text: impl Into<String>) -> MrigaResult<()> {
        self.send(UserIntent::SendText(text.into()))
    }

    pub fn toggle_mic(&self) -> MrigaResult<()> {
        self.send(UserIntent::ToggleMic)
    }

    pub fn select_mode(&self, mode: InteractionMode) -> MrigaResult<()> {
        self.send(UserIntent::SelectMode(mode))
    }

    pub fn select_personality(&self, name: impl Into<String>) -> MrigaResult<()> {
        self.send(UserIntent::SelectPersonality(name.into()))
    }

    pub fn add_personality(&self, draft: PersonaDraft, secret_code: impl Into<String>) -> MrigaResult<()> {
        self.send(UserIntent::AddPersonality {
            draft,
            secret_code: secret_code.into(),
        })
    }

    pub fn go_back(&self) -> MrigaResult<()> {
        self.send(UserIntent::GoBack)
    }

    /// Ask the engine loop to stop after the events already queued.
    pub fn shutdown(&self) -> MrigaResult<()> {
        self.events
            .send(ConversationEvent::Shutdown)
            .map_err(|_| MrigaError::ShuttingDown)
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.clone()
    }
}

/// Single-owner conversation state machine.
pub struct ConversationEngine {
    client: ChatClient,
    registry: PersonalityRegistry,
    selected: Personality,
    mode: InteractionMode,
    status: StatusMachine,
    transcript: Transcript,
    session: Option<ChatSession>,
    input: SpeechInput,
    output: SpeechOutput,
    /// Id of the latest send; stream events tagged otherwise are stale.
    turn: u64,
    stream_task: Option<JoinHandle<()>>,
    notice: Option<String>,
    events_tx: mpsc::UnboundedSender<ConversationEvent>,
    events_rx: mpsc::UnboundedReceiver<ConversationEvent>,
    snapshot_tx: watch::Sender<ConversationSnapshot>,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("backend", &self.client.backend_name())
            .field("selected", &self.selected.name)
            .field("mode", &self.mode)
            .field("status", &self.status.current())
            .field("turn", &self.turn)
            .field("messages", &self.transcript.len())
            .finish()
    }
}

impl ConversationEngine {
    /// Build an engine on the landing screen with the first registry entry
    /// selected and a session already open for it.
    pub fn new(client: ChatClient, registry: PersonalityRegistry, speech: SpeechEngines) -> Result<Self, ChatError> {
        let selected = registry
            .list()
            .first()
            .cloned()
            .ok_or_else(|| ChatError::Validation("personality registry is empty".to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sink = speech_sink(events_tx.clone());
        let input = SpeechInput::new(speech.recognizer, &speech.recognition_language, sink.clone());
        let output = SpeechOutput::new(speech.synthesizer, &speech.synthesis_language, sink);
        let session = client.create_session(&selected.system_prompt);

        let initial = ConversationSnapshot {
            mode: InteractionMode::Landing,
            status: ConversationStatus::Idle,
            transcript: Vec::new(),
            personalities: registry.list().to_vec(),
            selected: selected.clone(),
            recognition_supported: input.is_supported(),
            synthesis_supported: output.is_supported(),
            notice: None,
        };
        let (snapshot_tx, _) = watch::channel(initial);

        Ok(Self {
            client,
            registry,
            selected,
            mode: InteractionMode::Landing,
            status: StatusMachine::new(),
            transcript: Transcript::new(),
            session: Some(session),
            input,
            output,
            turn: 0,
            stream_task: None,
            notice: None,
            events_tx,
            events_rx,
            snapshot_tx,
        })
    }

    pub fn handle(&self) -> ConversationHandle {
        ConversationHandle {
            events: self.events_tx.clone(),
            snapshots: self.snapshot_tx.subscribe(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Process events until a shutdown is requested.
    pub async fn run(mut self) {
        tracing::info!(
            backend = self.client.backend_name(),
            personality = %self.selected.name,
            "Conversation engine started"
        );
        while self.step().await {}
        tracing::info!("Conversation engine stopped");
    }

    /// Wait for the next event and apply it. Returns `false` once the engine
    /// has shut down.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.dispatch(event),
            None => false,
        }
    }

    /// Apply one event and publish the new snapshot.
    pub fn dispatch(&mut self, event: ConversationEvent) -> bool {
        let keep_running = match event {
            ConversationEvent::Intent(intent) => {
                self.handle_intent(intent);
                true
            }
            ConversationEvent::StreamChunk { turn, text } => {
                self.on_stream_chunk(turn, &text);
                true
            }
            ConversationEvent::StreamEnded { turn } => {
                self.on_stream_ended(turn);
                true
            }
            ConversationEvent::StreamFailed { turn, error } => {
                self.on_stream_failed(turn, error);
                true
            }
            ConversationEvent::Speech(event) => {
                self.on_speech_event(event);
                true
            }
            ConversationEvent::Shutdown => {
                self.abort_stream();
                self.input.abort();
                self.output.cancel();
                false
            }
        };
        self.publish();
        keep_running
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn status(&self) -> ConversationStatus {
        self.status.current()
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn transcript(&self) -> &[ConversationMessage] {
        self.transcript.messages()
    }

    pub fn selected(&self) -> &Personality {
        &self.selected
    }

    pub fn registry(&self) -> &PersonalityRegistry {
        &self.registry
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn current_turn(&self) -> u64 {
        self.turn
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            mode: self.mode,
            status: self.status.current(),
            transcript: self.transcript.messages().to_vec(),
            personalities: self.registry.list().to_vec(),
            selected: self.selected.clone(),
            recognition_supported: self.input.is_supported(),
            synthesis_supported: self.output.is_supported(),
            notice: self.notice.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // User intents
    // -------------------------------------------------------------------------

    fn handle_intent(&mut self, intent: UserIntent) {
        self.notice = None;
        let result = match intent {
            UserIntent::SelectMode(mode) => {
                self.select_mode(mode);
                Ok(())
            }
            UserIntent::SelectPersonality(name) => self.select_personality(&name),
            UserIntent::AddPersonality { draft, secret_code } => {
                self.add_personality(draft, &secret_code).map(|_| ())
            }
            UserIntent::SendText(text) => self.submit(&text),
            UserIntent::ToggleMic => self.toggle_mic(),
            UserIntent::GoBack => {
                self.go_back();
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "User intent rejected");
            self.notice = Some(e.to_string());
        }
    }

    /// Enter a conversation mode. `Landing` behaves like going back.
    pub fn select_mode(&mut self, mode: InteractionMode) {
        if mode == InteractionMode::Landing {
            self.go_back();
            return;
        }
        if self.mode == InteractionMode::Voice && mode != InteractionMode::Voice {
            self.input.abort();
            if self.status.current() == ConversationStatus::Listening {
                self.set_status(ConversationStatus::Idle);
            }
        }
        if self.session.is_none() {
            self.session = Some(self.client.create_session(&self.selected.system_prompt));
        }
        tracing::info!(%mode, "Interaction mode selected");
        self.mode = mode;
    }

    pub fn select_personality(&mut self, name: &str) -> Result<(), ChatError> {
        let personality = self
            .registry
            .find(name)
            .cloned()
            .ok_or_else(|| ChatError::UnknownPersonality(name.to_string()))?;
        self.change_personality(personality);
        Ok(())
    }

    /// Create a custom persona and switch to it.
    pub fn add_personality(&mut self, draft: PersonaDraft, secret_code: &str) -> Result<Personality, ChatError> {
        let personality = self.registry.create_custom(draft, secret_code)?;
        self.change_personality(personality.clone());
        Ok(personality)
    }

    /// Send one user message and start streaming the reply.
    ///
    /// Allowed in any status; a running turn is abandoned.
    pub fn submit(&mut self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let stream = self
            .session
            .as_ref()
            .ok_or(ChatError::NoSession)?
            .send_message_streaming(text);

        let previous = self.status.current();
        self.status.transition(ConversationStatus::Thinking)?;
        self.output.cancel();
        if previous == ConversationStatus::Listening {
            self.input.stop();
        }
        self.abort_stream();
        let turn = self.turn;

        self.transcript.begin_turn(text);
        self.stream_task = Some(spawn_forwarder(stream, turn, self.events_tx.clone()));
        tracing::info!(turn, personality = %self.selected.name, chars = text.len(), "Message submitted");
        Ok(())
    }

    /// Arm or disarm the microphone. Ignored outside voice mode and while a
    /// reply is in progress.
    pub fn toggle_mic(&mut self) -> Result<(), ChatError> {
        if self.mode != InteractionMode::Voice {
            tracing::debug!(mode = %self.mode, "Mic toggle outside voice mode ignored");
            return Ok(());
        }
        match self.status.current() {
            ConversationStatus::Idle => {
                self.output.cancel();
                self.input.start()?;
                self.set_status(ConversationStatus::Listening);
            }
            ConversationStatus::Listening => self.input.stop(),
            status => tracing::debug!(%status, "Mic toggle ignored"),
        }
        Ok(())
    }

    /// Leave the conversation for the landing screen.
    pub fn go_back(&mut self) {
        self.output.cancel();
        self.input.abort();
        self.abort_stream();
        self.transcript.clear();
        self.session = None;
        self.status.reset();
        self.mode = InteractionMode::Landing;
        tracing::info!("Returned to landing");
    }

    fn change_personality(&mut self, personality: Personality) {
        self.abort_stream();
        self.input.abort();
        self.output.cancel();
        self.transcript.clear();
        self.status.reset();
        self.session = Some(self.client.create_session(&personality.system_prompt));
        tracing::info!(personality = %personality.name, "Personality changed");
        self.selected = personality;
    }

    // -------------------------------------------------------------------------
    // Stream events
    // -------------------------------------------------------------------------

    fn is_current_turn(&self, turn: u64) -> bool {
        turn == self.turn && self.status.current() == ConversationStatus::Thinking
    }

    fn on_stream_chunk(&mut self, turn: u64, text: &str) {
        if !self.is_current_turn(turn) {
            tracing::trace!(turn, current = self.turn, "Stale chunk dropped");
            return;
        }
        self.transcript.append_to_reply(text);
    }

    fn on_stream_ended(&mut self, turn: u64) {
        if !self.is_current_turn(turn) {
            return;
        }
        self.stream_task = None;
        let reply = self.transcript.close_reply().unwrap_or_default();
        tracing::info!(turn, chars = reply.len(), "Reply complete");
        self.deliver_reply(&reply);
    }

    fn on_stream_failed(&mut self, turn: u64, error: LlmError) {
        if !self.is_current_turn(turn) {
            return;
        }
        self.stream_task = None;
        tracing::warn!(turn, error = %error, retryable = error.is_retryable(), "Reply stream failed");
        self.transcript.replace_reply(ERROR_MESSAGE);
        self.deliver_reply(ERROR_MESSAGE);
    }

    /// Speak the finished reply in voice mode, otherwise settle to Idle.
    fn deliver_reply(&mut self, text: &str) {
        if self.mode != InteractionMode::Voice || text.trim().is_empty() {
            self.set_status(ConversationStatus::Idle);
            return;
        }
        match self.output.speak(text, self.selected.gender) {
            Ok(_) => self.set_status(ConversationStatus::Speaking),
            Err(e) => {
                tracing::warn!(error = %e, "Reply could not be spoken");
                self.set_status(ConversationStatus::Idle);
            }
        }
    }

    /// Abandon the running stream, if any, and open a new turn id.
    fn abort_stream(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
            tracing::debug!(turn = self.turn, "Reply stream aborted");
        }
        self.turn += 1;
    }

    // -------------------------------------------------------------------------
    // Speech events
    // -------------------------------------------------------------------------

    fn on_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Recognition(event) => self.on_recognition(event),
            SpeechEvent::Synthesis(event) => self.on_synthesis(event),
            SpeechEvent::VoicesChanged => self.output.refresh_voices(),
        }
    }

    fn on_recognition(&mut self, event: RecognitionEvent) {
        let session = event.session();
        if !self.input.is_current(session) {
            tracing::trace!(session = %session, "Stale recognition event dropped");
            return;
        }
        let listening = self.status.current() == ConversationStatus::Listening;
        match event {
            RecognitionEvent::ListeningStarted { .. } => tracing::debug!(session = %session, "Microphone live"),
            RecognitionEvent::Utterance { text, .. } => {
                if !listening {
                    tracing::debug!(status = %self.status.current(), "Utterance outside Listening dropped");
                    return;
                }
                match normalize_transcript(&text) {
                    Some(text) => {
                        if let Err(e) = self.submit(&text) {
                            tracing::warn!(error = %e, "Recognized utterance not sent");
                        }
                    }
                    None => tracing::debug!("Empty utterance ignored"),
                }
            }
            RecognitionEvent::Error { code, .. } => {
                self.input.mark_ended(session);
                tracing::warn!(session = %session, %code, "Speech recognition error");
                if listening {
                    self.set_status(ConversationStatus::Idle);
                }
            }
            RecognitionEvent::Ended { .. } => {
                self.input.mark_ended(session);
                if listening {
                    self.set_status(ConversationStatus::Idle);
                }
            }
        }
    }

    fn on_synthesis(&mut self, event: SynthesisEvent) {
        let utterance = event.utterance();
        if !self.output.is_current(utterance) {
            tracing::trace!(utterance_id = %utterance, "Stale synthesis event dropped");
            return;
        }
        match event {
            SynthesisEvent::Started { .. } => {
                if self.status.current() == ConversationStatus::Thinking {
                    self.set_status(ConversationStatus::Speaking);
                }
            }
            SynthesisEvent::Ended { .. } => {
                self.output.finish(utterance);
                if self.status.current() == ConversationStatus::Speaking {
                    self.set_status(ConversationStatus::Idle);
                }
            }
            SynthesisEvent::Error { code, .. } => {
                tracing::warn!(utterance_id = %utterance, %code, "Speech synthesis error");
                self.output.finish(utterance);
                if self.status.current() == ConversationStatus::Speaking {
                    self.set_status(ConversationStatus::Idle);
                }
            }
        }
    }

    fn set_status(&mut self, target: ConversationStatus) {
        if let Err(e) = self.status.transition(target) {
            tracing::warn!(error = %e, "Status change refused");
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

fn speech_sink(events: mpsc::UnboundedSender<ConversationEvent>) -> SpeechEventSink {
    Arc::new(move |event| {
        if events.send(ConversationEvent::Speech(event)).is_err() {
            tracing::trace!("Speech event after engine shutdown");
        }
    })
}

/// Forward one reply stream into the engine's queue, tagged with `turn`.
fn spawn_forwarder(
    mut stream: ChunkStream,
    turn: u64,
    events: mpsc::UnboundedSender<ConversationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let event = match item {
                Ok(chunk) => ConversationEvent::StreamChunk {
                    turn,
                    text: chunk.text,
                },
                Err(error) => {
                    let _ = events.send(ConversationEvent::StreamFailed { turn, error });
                    return;
                }
            };
            if events.send(event).is_err() {
                return;
            }
        }
        let _ = events.send(ConversationEvent::StreamEnded { turn });
    })
}
