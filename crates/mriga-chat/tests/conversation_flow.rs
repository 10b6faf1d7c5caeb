//! End-to-end conversation flows against fake host speech engines and a
//! scripted chat backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mriga_chat::{
    ConversationEngine, ConversationEvent, ConversationStatus, PersonaDraft, PersonalityRegistry,
    SpeechEngines, UserIntent, ERROR_MESSAGE,
};
use mriga_core::types::{InteractionMode, Speaker, VoiceGender, VoiceTag};
use mriga_llm::{ChatClient, ScriptedBackend, ScriptedReply};
use mriga_speech::{
    HostVoice, RecognitionEngine, RecognitionEvent, RecognitionSettings, SpeechError, SpeechEvent,
    SpeechEventSink, SynthesisEngine, SynthesisEvent, Utterance,
};
use uuid::Uuid;

// =============================================================================
// Fake host
// =============================================================================

#[derive(Default)]
struct Host {
    voices: Vec<HostVoice>,
    recognition_sessions: Vec<Uuid>,
    recognition_stops: usize,
    recognition_aborts: usize,
    spoken: Vec<Utterance>,
    synthesis_cancels: usize,
}

type SharedHost = Arc<Mutex<Host>>;

struct FakeRecognizer(SharedHost);

impl RecognitionEngine for FakeRecognizer {
    fn start(
        &mut self,
        session: Uuid,
        settings: &RecognitionSettings,
        sink: SpeechEventSink,
    ) -> Result<(), SpeechError> {
        assert!(!settings.continuous);
        self.0.lock().unwrap().recognition_sessions.push(session);
        sink(SpeechEvent::Recognition(RecognitionEvent::ListeningStarted { session }));
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().recognition_stops += 1;
    }

    fn abort(&mut self) {
        self.0.lock().unwrap().recognition_aborts += 1;
    }
}

struct FakeSynthesizer(SharedHost);

impl SynthesisEngine for FakeSynthesizer {
    fn voices(&self) -> Vec<HostVoice> {
        self.0.lock().unwrap().voices.clone()
    }

    fn speak(&mut self, utterance: Utterance, sink: SpeechEventSink) -> Result<(), SpeechError> {
        let id = utterance.id;
        self.0.lock().unwrap().spoken.push(utterance);
        sink(SpeechEvent::Synthesis(SynthesisEvent::Started { utterance: id }));
        Ok(())
    }

    fn cancel(&mut self) {
        self.0.lock().unwrap().synthesis_cancels += 1;
    }
}

struct Harness {
    engine: ConversationEngine,
    backend: Arc<ScriptedBackend>,
    host: SharedHost,
}

impl Harness {
    fn new(voices: Vec<HostVoice>) -> Self {
        let host: SharedHost = Arc::new(Mutex::new(Host {
            voices,
            ..Host::default()
        }));
        let backend = Arc::new(ScriptedBackend::new());
        let speech = SpeechEngines::default()
            .with_recognizer(FakeRecognizer(host.clone()))
            .with_synthesizer(FakeSynthesizer(host.clone()));
        let engine = ConversationEngine::new(
            ChatClient::new(backend.clone()),
            PersonalityRegistry::with_presets(),
            speech,
        )
        .unwrap();
        Self { engine, backend, host }
    }

    fn voice() -> Self {
        let mut h = Self::new(Vec::new());
        h.engine.select_mode(InteractionMode::Voice);
        h
    }

    fn text() -> Self {
        let mut h = Self::new(Vec::new());
        h.engine.select_mode(InteractionMode::Text);
        h
    }

    fn status(&self) -> ConversationStatus {
        self.engine.status()
    }

    fn reply_text(&self) -> String {
        self.engine.transcript().last().unwrap().text.clone()
    }

    fn hear(&mut self, event: RecognitionEvent) {
        self.engine
            .dispatch(ConversationEvent::Speech(SpeechEvent::Recognition(event)));
    }

    /// Id of the most recently started recognition session.
    fn mic_session(&self) -> Uuid {
        self.host.lock().unwrap().recognition_sessions.last().copied().unwrap()
    }

    fn hear_utterance(&mut self, text: &str) {
        let session = self.mic_session();
        self.hear(RecognitionEvent::Utterance {
            session,
            text: text.to_string(),
        });
    }

    fn hear_end(&mut self) {
        let session = self.mic_session();
        self.hear(RecognitionEvent::Ended { session });
    }

    fn hear_error(&mut self, code: &str) {
        let session = self.mic_session();
        self.hear(RecognitionEvent::Error {
            session,
            code: code.to_string(),
        });
    }

    fn recognition_starts(&self) -> usize {
        self.host.lock().unwrap().recognition_sessions.len()
    }

    fn last_utterance(&self) -> Utterance {
        self.host.lock().unwrap().spoken.last().cloned().unwrap()
    }

    fn finish_speaking(&mut self) {
        let utterance = self.last_utterance().id;
        self.engine
            .dispatch(ConversationEvent::Speech(SpeechEvent::Synthesis(
                SynthesisEvent::Ended { utterance },
            )));
    }

    /// Process queued events until `done` holds.
    async fn run_until(&mut self, done: impl Fn(&ConversationEngine) -> bool) {
        let engine = &mut self.engine;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(&*engine) {
                assert!(engine.step().await);
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn settle(&mut self) {
        self.run_until(|e| e.status() != ConversationStatus::Thinking)
            .await;
    }

    /// Complete one voice turn so that the engine ends up Speaking.
    async fn reach_speaking(&mut self) {
        self.backend
            .push_reply(ScriptedReply::complete(&["Aaiye, ", "idhar meeting karte hai"]));
        self.engine.submit("kya plan hai?").unwrap();
        self.settle().await;
        assert_eq!(self.status(), ConversationStatus::Speaking);
    }
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_reply_is_concatenation_of_chunks_in_order() {
    let mut h = Harness::voice();
    h.backend.push_reply(ScriptedReply::complete(&[
        "Ho ",
        "jaega, ",
        "tension ",
        "mat lijiye",
    ]));

    h.engine.submit("paisa?").unwrap();
    assert_eq!(h.status(), ConversationStatus::Thinking);
    h.settle().await;

    assert_eq!(h.status(), ConversationStatus::Speaking);
    assert_eq!(h.reply_text(), "Ho jaega, tension mat lijiye");
    assert_eq!(h.last_utterance().text, "Ho jaega, tension mat lijiye");

    h.finish_speaking();
    assert_eq!(h.status(), ConversationStatus::Idle);
}

#[tokio::test]
async fn test_text_mode_never_speaks() {
    let mut h = Harness::text();
    h.backend.push_reply(ScriptedReply::complete(&["Namaste"]));
    h.engine.submit("hello").unwrap();
    h.settle().await;

    assert_eq!(h.status(), ConversationStatus::Idle);
    assert_eq!(h.reply_text(), "Namaste");
    assert!(h.host.lock().unwrap().spoken.is_empty());
}

#[tokio::test]
async fn test_failure_after_two_of_five_chunks_shows_error_message() {
    let mut h = Harness::text();
    h.backend
        .push_reply(ScriptedReply::fail_after(&["1", "2", "3", "4", "5"], 2));
    h.engine.submit("hello").unwrap();
    h.settle().await;

    assert_eq!(h.status(), ConversationStatus::Idle);
    let transcript = h.engine.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].speaker, Speaker::Assistant);
    assert_eq!(transcript[1].text, ERROR_MESSAGE);
}

#[tokio::test]
async fn test_failure_in_voice_mode_speaks_error_message() {
    let mut h = Harness::voice();
    h.backend.push_reply(ScriptedReply::fail_on_open());
    h.engine.submit("hello").unwrap();
    h.settle().await;

    assert_eq!(h.status(), ConversationStatus::Speaking);
    assert_eq!(h.reply_text(), ERROR_MESSAGE);
    assert_eq!(h.last_utterance().text, ERROR_MESSAGE);
}

#[tokio::test]
async fn test_empty_reply_in_voice_mode_returns_to_idle() {
    let mut h = Harness::voice();
    h.backend.push_reply(ScriptedReply::complete(&[]));
    h.engine.submit("hello").unwrap();
    h.settle().await;

    assert_eq!(h.status(), ConversationStatus::Idle);
    assert!(h.host.lock().unwrap().spoken.is_empty());
}

#[tokio::test]
async fn test_forced_send_while_speaking_cancels_synthesis() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    let first = h.last_utterance().id;
    let cancels = h.host.lock().unwrap().synthesis_cancels;

    h.backend.push_reply(ScriptedReply::complete(&["Kal ", "pakka"]));
    h.engine.submit("aur?").unwrap();
    assert_eq!(h.status(), ConversationStatus::Thinking);
    assert_eq!(h.host.lock().unwrap().synthesis_cancels, cancels + 1);

    // The cancelled utterance's end must not settle the new turn.
    h.engine
        .dispatch(ConversationEvent::Speech(SpeechEvent::Synthesis(
            SynthesisEvent::Ended { utterance: first },
        )));
    assert_eq!(h.status(), ConversationStatus::Thinking);

    h.settle().await;
    let transcript = h.engine.transcript();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript[1].text, "Aaiye, idhar meeting karte hai");
    assert_eq!(transcript[3].text, "Kal pakka");
}

#[tokio::test]
async fn test_forced_send_while_thinking_does_not_interleave() {
    let mut h = Harness::text();
    h.backend
        .push_reply(ScriptedReply::stall_after(&["first-a", "first-b"], 1));
    h.engine.submit("one").unwrap();
    h.run_until(|e| e.transcript()[1].text == "first-a").await;

    h.backend.push_reply(ScriptedReply::complete(&["second-a", "second-b"]));
    h.engine.submit("two").unwrap();
    h.settle().await;

    let transcript = h.engine.transcript();
    assert_eq!(transcript.len(), 4);
    assert_eq!(transcript[1].text, "first-a");
    assert_eq!(transcript[2].text, "two");
    assert_eq!(transcript[3].text, "second-asecond-b");
    assert_eq!(h.status(), ConversationStatus::Idle);
}

#[tokio::test]
async fn test_history_follows_the_session() {
    let mut h = Harness::text();
    h.backend.push_reply(ScriptedReply::complete(&["pehla"]));
    h.backend.push_reply(ScriptedReply::complete(&["doosra"]));
    h.engine.submit("one").unwrap();
    h.settle().await;
    h.engine.submit("two").unwrap();
    h.settle().await;

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].history[1].text, "pehla");
}

// =============================================================================
// Personality
// =============================================================================

#[tokio::test]
async fn test_personality_switch_resets_from_any_status() {
    // Listening
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Listening);
    h.engine.select_personality("Amar Bhai").unwrap();
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert_eq!(h.host.lock().unwrap().recognition_aborts, 1);

    // Thinking
    let mut h = Harness::voice();
    h.backend.push_reply(ScriptedReply::stall_after(&["a"], 1));
    h.engine.submit("hello").unwrap();
    let old_session = h.engine.session().unwrap().id();
    h.engine.select_personality("Pappu Halwai").unwrap();
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert!(h.engine.transcript().is_empty());
    assert_ne!(h.engine.session().unwrap().id(), old_session);
    assert_eq!(h.engine.selected().name, "Pappu Halwai");

    // Speaking
    let mut h = Harness::voice();
    h.reach_speaking().await;
    let cancels = h.host.lock().unwrap().synthesis_cancels;
    h.engine.select_personality("Raju Thekedar").unwrap();
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert!(h.engine.transcript().is_empty());
    assert_eq!(h.host.lock().unwrap().synthesis_cancels, cancels + 1);
}

#[tokio::test]
async fn test_new_session_uses_new_system_prompt() {
    let mut h = Harness::text();
    h.engine.select_personality("Amar Bhai").unwrap();
    h.engine.submit("kaun ho?").unwrap();
    h.settle().await;

    let requests = h.backend.requests();
    assert!(requests[0].system_prompt.starts_with("You are Amar Bhai"));
    assert!(requests[0].history.is_empty());
}

#[tokio::test]
async fn test_add_personality_code_is_case_insensitive() {
    for code in ["HYDRA", "hydra", "HyDrA"] {
        let mut h = Harness::text();
        let draft = PersonaDraft {
            name: "Chaiwala".to_string(),
            instruction: "You sell chai.".to_string(),
            gender: None,
        };
        h.engine.dispatch(
            UserIntent::AddPersonality {
                draft,
                secret_code: code.to_string(),
            }
            .into(),
        );
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.personalities.len(), 5);
        assert_eq!(snapshot.personalities[0].name, "Chaiwala");
        assert_eq!(snapshot.selected.name, "Chaiwala");
        assert_eq!(snapshot.selected.system_prompt, "You are a Bihari Indian. You sell chai.");
        assert_eq!(snapshot.notice, None);
    }
}

#[tokio::test]
async fn test_add_personality_wrong_code_is_rejected() {
    for code in ["hydr", ""] {
        let mut h = Harness::text();
        h.engine.dispatch(
            UserIntent::AddPersonality {
                draft: PersonaDraft {
                    name: "Chaiwala".to_string(),
                    instruction: "You sell chai.".to_string(),
                    gender: None,
                },
                secret_code: code.to_string(),
            }
            .into(),
        );
        let snapshot = h.engine.snapshot();
        assert_eq!(snapshot.personalities.len(), 4);
        assert_eq!(snapshot.selected.name, "Rajeev");
        assert_eq!(
            snapshot.notice.as_deref(),
            Some("Incorrect secret code. Access denied.")
        );
    }
}

// =============================================================================
// Voice selection
// =============================================================================

fn female_persona(h: &mut Harness) {
    let draft = PersonaDraft {
        name: "Rinki".to_string(),
        instruction: "You run a beauty parlour in Gaya.".to_string(),
        gender: Some(VoiceGender::Female),
    };
    h.engine.add_personality(draft, "hydra").unwrap();
}

#[tokio::test]
async fn test_female_persona_gets_high_quality_female_voice() {
    let mut h = Harness::new(vec![
        HostVoice::new("X Male", "hi-IN", vec![VoiceTag::Male]),
        HostVoice::new(
            "Google Y Female",
            "hi-IN",
            vec![VoiceTag::Female, VoiceTag::HighQuality],
        ),
    ]);
    h.engine.select_mode(InteractionMode::Voice);
    female_persona(&mut h);
    h.engine.submit("hello").unwrap();
    h.settle().await;

    let utterance = h.last_utterance();
    assert_eq!(utterance.voice.unwrap().name, "Google Y Female");
    assert_eq!(utterance.language.as_deref(), Some("hi-IN"));
}

#[tokio::test]
async fn test_female_persona_falls_back_to_male_voice() {
    let mut h = Harness::new(vec![HostVoice::new("X Male", "hi-IN", vec![VoiceTag::Male])]);
    h.engine.select_mode(InteractionMode::Voice);
    female_persona(&mut h);
    h.engine.submit("hello").unwrap();
    h.settle().await;

    assert_eq!(h.last_utterance().voice.unwrap().name, "X Male");
}

#[tokio::test]
async fn test_voices_changed_refreshes_selection() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    assert!(h.last_utterance().voice.is_none());
    h.finish_speaking();

    h.host.lock().unwrap().voices = vec![HostVoice::from_name("Google हिन्दी Male", "hi-IN")];
    h.engine
        .dispatch(ConversationEvent::Speech(SpeechEvent::VoicesChanged));
    h.reach_speaking().await;
    assert_eq!(h.last_utterance().voice.unwrap().name, "Google हिन्दी Male");
}

#[tokio::test]
async fn test_rejected_submit_leaves_playback_and_turn_alone() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    let cancels = h.host.lock().unwrap().synthesis_cancels;
    let turn = h.engine.current_turn();
    let messages = h.engine.transcript().len();

    assert!(h.engine.submit("   ").is_err());
    assert_eq!(h.status(), ConversationStatus::Speaking);
    assert_eq!(h.host.lock().unwrap().synthesis_cancels, cancels);
    assert_eq!(h.engine.current_turn(), turn);
    assert_eq!(h.engine.transcript().len(), messages);

    h.finish_speaking();
    assert_eq!(h.status(), ConversationStatus::Idle);
}

// =============================================================================
// Microphone
// =============================================================================

#[tokio::test]
async fn test_spoken_utterance_becomes_a_turn() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Listening);

    h.backend.push_reply(ScriptedReply::complete(&["Rohit Sharma!"]));
    h.hear_utterance("  favourite batsman?  ");
    assert_eq!(h.status(), ConversationStatus::Thinking);
    assert_eq!(h.engine.transcript()[0].text, "favourite batsman?");
    assert_eq!(h.host.lock().unwrap().recognition_stops, 1);

    h.settle().await;
    assert_eq!(h.status(), ConversationStatus::Speaking);
}

#[tokio::test]
async fn test_recognition_end_during_thinking_keeps_thinking() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    h.backend.push_reply(ScriptedReply::stall_after(&["..."], 0));
    h.hear_utterance("kab doge?");
    assert_eq!(h.status(), ConversationStatus::Thinking);

    h.hear_end();
    assert_eq!(h.status(), ConversationStatus::Thinking);
}

#[tokio::test]
async fn test_recognition_without_result_returns_to_idle() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    h.hear_utterance("   ");
    assert_eq!(h.status(), ConversationStatus::Listening);
    h.hear_end();
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert!(h.engine.transcript().is_empty());
}

#[tokio::test]
async fn test_recognition_error_returns_to_idle() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    h.hear_error("no-speech");
    assert_eq!(h.status(), ConversationStatus::Idle);
}

#[tokio::test]
async fn test_mic_toggle_while_listening_stops_recognition() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.host.lock().unwrap().recognition_stops, 1);
    // Idle only once the recognizer reports its end.
    assert_eq!(h.status(), ConversationStatus::Listening);
    h.hear_end();
    assert_eq!(h.status(), ConversationStatus::Idle);
}

#[tokio::test]
async fn test_mic_toggle_while_speaking_has_no_effect() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    h.engine.toggle_mic().unwrap();

    assert_eq!(h.status(), ConversationStatus::Speaking);
    assert_eq!(h.recognition_starts(), 0);
    assert_eq!(h.host.lock().unwrap().recognition_stops, 0);
}

#[tokio::test]
async fn test_mic_toggle_while_thinking_has_no_effect() {
    let mut h = Harness::voice();
    h.backend.push_reply(ScriptedReply::stall_after(&[], 0));
    h.engine.submit("hello").unwrap();
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Thinking);
    assert_eq!(h.recognition_starts(), 0);
}

#[tokio::test]
async fn test_mic_ignored_in_text_mode() {
    let mut h = Harness::text();
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert_eq!(h.recognition_starts(), 0);
}

#[tokio::test]
async fn test_mic_start_after_playback_leaves_host_alone() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    h.finish_speaking();
    let cancels = h.host.lock().unwrap().synthesis_cancels;

    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Listening);
    // Nothing was playing any more, so the host is not asked to cancel.
    assert_eq!(h.host.lock().unwrap().synthesis_cancels, cancels);
}

#[tokio::test]
async fn test_late_end_of_aborted_session_is_ignored() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    let aborted = h.mic_session();

    h.engine.select_personality("Amar Bhai").unwrap();
    assert_eq!(h.host.lock().unwrap().recognition_aborts, 1);
    h.engine.toggle_mic().unwrap();
    assert_eq!(h.status(), ConversationStatus::Listening);

    // The host reports the end of the session it was told to abort.
    h.hear(RecognitionEvent::Ended { session: aborted });
    h.hear(RecognitionEvent::Error {
        session: aborted,
        code: "aborted".to_string(),
    });
    assert_eq!(h.status(), ConversationStatus::Listening);

    // The live session still reaches the host when leaving.
    h.engine.go_back();
    assert_eq!(h.host.lock().unwrap().recognition_aborts, 2);
}

#[tokio::test]
async fn test_utterance_from_aborted_session_is_dropped() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    let aborted = h.mic_session();
    h.engine.select_mode(InteractionMode::Text);
    h.engine.select_mode(InteractionMode::Voice);
    h.engine.toggle_mic().unwrap();

    h.hear(RecognitionEvent::Utterance {
        session: aborted,
        text: "purana baat".to_string(),
    });
    assert_eq!(h.status(), ConversationStatus::Listening);
    assert!(h.engine.transcript().is_empty());
}

#[tokio::test]
async fn test_leaving_voice_mode_aborts_recognition() {
    let mut h = Harness::voice();
    h.engine.toggle_mic().unwrap();
    h.engine.select_mode(InteractionMode::Text);
    assert_eq!(h.status(), ConversationStatus::Idle);
    assert_eq!(h.host.lock().unwrap().recognition_aborts, 1);
}

// =============================================================================
// Navigation
// =============================================================================

#[tokio::test]
async fn test_go_back_from_speaking() {
    let mut h = Harness::voice();
    h.reach_speaking().await;
    let cancels = h.host.lock().unwrap().synthesis_cancels;

    h.engine.dispatch(UserIntent::GoBack.into());
    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.mode, InteractionMode::Landing);
    assert_eq!(snapshot.status, ConversationStatus::Idle);
    assert!(snapshot.transcript.is_empty());
    assert_eq!(h.host.lock().unwrap().synthesis_cancels, cancels + 1);
    assert!(h.engine.session().is_none());
}

#[tokio::test]
async fn test_snapshot_reports_host_capabilities() {
    let h = Harness::voice();
    let snapshot = h.engine.snapshot();
    assert!(snapshot.recognition_supported);
    assert!(snapshot.synthesis_supported);
    assert_eq!(snapshot.mode, InteractionMode::Voice);
}
