//! Terminal stand-ins for the host speech engines.
//!
//! The recognizer "hears" the next line typed while the microphone is on.
//! The synthesizer prints what it would say and holds the utterance open for
//! as long as reading it aloud would take.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mriga_core::config::SpeechConfig;
use mriga_speech::{
    HostVoice, RecognitionEngine, RecognitionEvent, RecognitionSettings, SpeechError, SpeechEvent,
    SpeechEventSink, SynthesisEngine, SynthesisEvent, Utterance,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The live console recognition session.
type Armed = Option<(Uuid, SpeechEventSink)>;

/// Shared switch between the REPL's stdin reader and the recognizer.
#[derive(Clone, Default)]
pub struct MicTap {
    armed: Arc<Mutex<Armed>>,
}

impl MicTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a typed line to an armed recognizer.
    ///
    /// Returns false when the microphone is off and the line should be
    /// treated as ordinary input.
    pub fn deliver(&self, line: &str) -> bool {
        let Some((session, sink)) = self.slot().take() else {
            return false;
        };
        tracing::debug!(session = %session, chars = line.len(), "Console recognizer heard a line");
        sink(
            RecognitionEvent::Utterance {
                session,
                text: line.to_string(),
            }
            .into(),
        );
        sink(RecognitionEvent::Ended { session }.into());
        true
    }

    fn slot(&self) -> MutexGuard<'_, Armed> {
        self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Recognition engine fed by [`MicTap::deliver`].
pub struct ConsoleRecognizer {
    tap: MicTap,
}

impl ConsoleRecognizer {
    pub fn new(tap: MicTap) -> Self {
        Self { tap }
    }
}

impl RecognitionEngine for ConsoleRecognizer {
    fn start(
        &mut self,
        session: Uuid,
        settings: &RecognitionSettings,
        sink: SpeechEventSink,
    ) -> Result<(), SpeechError> {
        let mut slot = self.tap.slot();
        if slot.is_some() {
            return Err(SpeechError::Recognition("recognizer is already listening".to_string()));
        }
        tracing::debug!(session = %session, language = %settings.language, "Console recognizer armed");
        sink(RecognitionEvent::ListeningStarted { session }.into());
        *slot = Some((session, sink));
        Ok(())
    }

    fn stop(&mut self) {
        // Stopping before anything was typed ends the session without a result.
        let armed = self.tap.slot().take();
        if let Some((session, sink)) = armed {
            sink(RecognitionEvent::Ended { session }.into());
        }
    }

    fn abort(&mut self) {
        self.tap.slot().take();
    }
}

/// Synthesis engine that prints utterances at a fixed speaking rate.
pub struct ConsoleSynthesizer {
    voices: Vec<HostVoice>,
    words_per_minute: u32,
    playing: Option<(Utterance, SpeechEventSink, JoinHandle<()>)>,
}

impl ConsoleSynthesizer {
    pub fn new(config: &SpeechConfig) -> Self {
        let voices = config
            .voices
            .iter()
            .map(|entry| {
                if entry.tags.is_empty() {
                    HostVoice::from_name(&entry.name, &entry.language)
                } else {
                    HostVoice::new(&entry.name, &entry.language, entry.tags.clone())
                }
            })
            .collect();
        Self {
            voices,
            words_per_minute: config.words_per_minute,
            playing: None,
        }
    }

    /// How long reading `text` aloud takes at the configured rate.
    pub fn duration_for(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as u64;
        let wpm = u64::from(self.words_per_minute.max(1));
        Duration::from_millis(words * 60_000 / wpm)
    }
}

impl SynthesisEngine for ConsoleSynthesizer {
    fn voices(&self) -> Vec<HostVoice> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: Utterance, sink: SpeechEventSink) -> Result<(), SpeechError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SpeechError::Synthesis("no async runtime for playback".to_string()))?;
        self.cancel();

        let voice = utterance
            .voice
            .as_ref()
            .map(|v| v.name.as_str())
            .unwrap_or("default voice");
        println!("  (speaking with {voice})");

        let id = utterance.id;
        let duration = self.duration_for(&utterance.text);
        let task_sink = sink.clone();
        let task = runtime.spawn(async move {
            task_sink(SynthesisEvent::Started { utterance: id }.into());
            tokio::time::sleep(duration).await;
            task_sink(SynthesisEvent::Ended { utterance: id }.into());
        });
        self.playing = Some((utterance, sink, task));
        Ok(())
    }

    fn cancel(&mut self) {
        let Some((utterance, sink, task)) = self.playing.take() else {
            return;
        };
        if task.is_finished() {
            return;
        }
        task.abort();
        tracing::debug!(utterance = %utterance.id, "Console playback interrupted");
        sink(SpeechEvent::Synthesis(SynthesisEvent::Error {
            utterance: utterance.id,
            code: "interrupted".to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mriga_core::config::VoiceEntry;
    use mriga_core::types::VoiceTag;

    fn recording_sink() -> (SpeechEventSink, Arc<Mutex<Vec<SpeechEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink: SpeechEventSink = Arc::new(move |event| captured.lock().unwrap().push(event));
        (sink, events)
    }

    #[test]
    fn test_line_goes_to_armed_recognizer_only() {
        let tap = MicTap::new();
        let mut recognizer = ConsoleRecognizer::new(tap.clone());
        let (sink, events) = recording_sink();
        let session = Uuid::new_v4();

        assert!(!tap.deliver("ignored"));
        recognizer
            .start(session, &RecognitionSettings::single_utterance("en-US"), sink)
            .unwrap();
        assert!(tap.slot().is_some());
        assert!(tap.deliver("kya haal hai"));
        assert!(tap.slot().is_none());

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                SpeechEvent::Recognition(RecognitionEvent::ListeningStarted { session }),
                SpeechEvent::Recognition(RecognitionEvent::Utterance {
                    session,
                    text: "kya haal hai".to_string()
                }),
                SpeechEvent::Recognition(RecognitionEvent::Ended { session }),
            ]
        );
    }

    #[test]
    fn test_second_start_is_refused() {
        let tap = MicTap::new();
        let mut recognizer = ConsoleRecognizer::new(tap);
        let (sink, _) = recording_sink();
        let settings = RecognitionSettings::single_utterance("en-US");
        recognizer.start(Uuid::new_v4(), &settings, sink.clone()).unwrap();
        assert!(matches!(
            recognizer.start(Uuid::new_v4(), &settings, sink),
            Err(SpeechError::Recognition(_))
        ));
    }

    #[test]
    fn test_stop_ends_without_result_and_abort_is_silent() {
        let tap = MicTap::new();
        let mut recognizer = ConsoleRecognizer::new(tap.clone());
        let settings = RecognitionSettings::single_utterance("en-US");

        let (sink, events) = recording_sink();
        let session = Uuid::new_v4();
        recognizer.start(session, &settings, sink).unwrap();
        recognizer.stop();
        assert_eq!(
            events.lock().unwrap().last(),
            Some(&SpeechEvent::Recognition(RecognitionEvent::Ended { session }))
        );

        let (sink, events) = recording_sink();
        recognizer.start(Uuid::new_v4(), &settings, sink).unwrap();
        recognizer.abort();
        assert_eq!(events.lock().unwrap().len(), 1);
        assert!(!tap.deliver("too late"));
    }

    #[test]
    fn test_voices_from_config() {
        let config = SpeechConfig {
            voices: vec![
                VoiceEntry {
                    name: "Google हिन्दी".to_string(),
                    language: "hi-IN".to_string(),
                    tags: Vec::new(),
                },
                VoiceEntry {
                    name: "Lekha".to_string(),
                    language: "hi-IN".to_string(),
                    tags: vec![VoiceTag::Female],
                },
            ],
            ..SpeechConfig::default()
        };
        let voices = ConsoleSynthesizer::new(&config).voices();
        assert!(voices[0].has_tag(VoiceTag::HighQuality));
        assert!(voices[1].has_tag(VoiceTag::Female));
    }

    #[test]
    fn test_duration_follows_speaking_rate() {
        let config = SpeechConfig {
            words_per_minute: 120,
            ..SpeechConfig::default()
        };
        let synth = ConsoleSynthesizer::new(&config);
        assert_eq!(synth.duration_for("ek do teen chaar"), Duration::from_secs(2));
        assert_eq!(synth.duration_for(""), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_ends_after_duration() {
        let mut synth = ConsoleSynthesizer::new(&SpeechConfig::default());
        let (sink, events) = recording_sink();
        let utterance = Utterance {
            id: Uuid::new_v4(),
            text: "Ka ho".to_string(),
            voice: None,
            language: None,
        };
        let id = utterance.id;
        synth.speak(utterance, sink).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                SpeechEvent::Synthesis(SynthesisEvent::Started { utterance: id }),
                SpeechEvent::Synthesis(SynthesisEvent::Ended { utterance: id }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_interruption() {
        let mut synth = ConsoleSynthesizer::new(&SpeechConfig::default());
        let (sink, events) = recording_sink();
        let utterance = Utterance {
            id: Uuid::new_v4(),
            text: "a fairly long sentence that takes a while".to_string(),
            voice: None,
            language: None,
        };
        let id = utterance.id;
        synth.speak(utterance, sink).unwrap();
        tokio::task::yield_now().await;
        synth.cancel();

        tokio::time::sleep(Duration::from_secs(30)).await;
        let events = events.lock().unwrap();
        assert_eq!(
            events.last(),
            Some(&SpeechEvent::Synthesis(SynthesisEvent::Error {
                utterance: id,
                code: "interrupted".to_string(),
            }))
        );
        assert!(!events.contains(&SpeechEvent::Synthesis(SynthesisEvent::Ended { utterance: id })));
    }
}
