//! Voice engine: speech input and output state for a conversation.
//!
//! The `VoiceEngine` owns the listening/speaking flags, the running transcript
//! and the selected output voice. Platform engines are driven through the
//! [`SpeechRecognizer`] and [`SpeechSynthesizer`] traits; their callbacks come
//! back as [`PlatformSignal`]s and are applied by [`VoiceEngine::handle_signal`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kiki_core::config::VoiceConfig;
use kiki_core::events::{DomainEvent, EventBus};
use kiki_core::markup::speakable_text;
use kiki_core::notice::show_notice;
use kiki_core::types::Timestamp;

use crate::error::VoiceError;
use crate::platform::{
    PlatformSignal, RecognitionSettings, SpeechRecognizer, SpeechSynthesizer, Utterance,
    VoiceInfo,
};
use crate::voices::{accumulate_transcript, choose_voice, VoiceGroups};

/// Which voice features have a platform engine behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub recognition: bool,
    pub synthesis: bool,
}

impl Capabilities {
    pub fn is_complete(&self) -> bool {
        self.recognition && self.synthesis
    }

    /// Human-readable names of the missing features.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.recognition {
            missing.push("voice input");
        }
        if !self.synthesis {
            missing.push("voice output");
        }
        missing
    }
}

#[derive(Debug)]
struct VoiceState {
    listening: bool,
    speaking: bool,
    transcript: String,
    selected_voice: Option<VoiceInfo>,
    auto_speak: bool,
    /// The only utterance whose platform callbacks are honoured.
    current_utterance: Option<Uuid>,
    compatibility_notice_shown: bool,
}

pub struct VoiceEngine {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    config: VoiceConfig,
    events: EventBus,
    state: Mutex<VoiceState>,
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("capabilities", &self.capabilities())
            .field("state", &self.state)
            .finish()
    }
}

impl VoiceEngine {
    /// Build an engine over whatever platform engines exist. `None` marks the
    /// feature as unsupported.
    pub fn new(
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        events: EventBus,
        config: &VoiceConfig,
    ) -> Self {
        Self {
            recognizer,
            synthesizer,
            config: config.clone(),
            events,
            state: Mutex::new(VoiceState {
                listening: false,
                speaking: false,
                transcript: String::new(),
                selected_voice: None,
                auto_speak: config.auto_speak,
                current_utterance: None,
                compatibility_notice_shown: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VoiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            recognition: self.recognizer.is_some(),
            synthesis: self.synthesizer.is_some(),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.lock().listening
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().speaking
    }

    pub fn transcript(&self) -> String {
        self.lock().transcript.clone()
    }

    /// Id of the utterance still playing or queued, if any.
    pub fn current_utterance(&self) -> Option<Uuid> {
        self.lock().current_utterance
    }

    pub fn auto_speak(&self) -> bool {
        self.lock().auto_speak
    }

    pub fn set_auto_speak(&self, enabled: bool) {
        self.lock().auto_speak = enabled;
    }

    /// Flip auto-speak and return the new value.
    pub fn toggle_auto_speak(&self) -> bool {
        let mut state = self.lock();
        state.auto_speak = !state.auto_speak;
        info!(auto_speak = state.auto_speak, "Auto-speak toggled");
        state.auto_speak
    }

    pub fn selected_voice(&self) -> Option<String> {
        self.lock().selected_voice.as_ref().map(|v| v.name.clone())
    }

    /// Show the unsupported-features notice once per engine.
    ///
    /// Returns the notice id, or `None` when every feature is supported or the
    /// notice was already shown.
    pub fn compatibility_notice(&self) -> Option<Uuid> {
        let capabilities = self.capabilities();
        if capabilities.is_complete() {
            return None;
        }
        {
            let mut state = self.lock();
            if state.compatibility_notice_shown {
                return None;
            }
            state.compatibility_notice_shown = true;
        }
        let text = format!(
            "Voice features ({}) are not supported on this system. Text chat keeps working as usual.",
            capabilities.missing().join(" and ")
        );
        Some(show_notice(
            &self.events,
            text,
            Duration::from_secs(self.config.compatibility_notice_secs),
        ))
    }

    // =========================================================================
    // Recognition
    // =========================================================================

    /// Start recognition. Does nothing when already listening.
    pub fn start_listening(&self) -> Result<(), VoiceError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(VoiceError::Unsupported("voice input"))?;

        let mut state = self.lock();
        if state.listening {
            return Ok(());
        }

        let settings = RecognitionSettings {
            lang: self.config.lang.clone(),
            continuous: self.config.continuous,
            interim_results: self.config.interim_results,
        };
        if let Err(e) = recognizer.start(&settings) {
            error!(error = %e, "Failed to start speech recognition");
            return Err(e);
        }

        state.listening = true;
        state.transcript.clear();
        drop(state);

        info!("Listening started");
        self.publish_listening(true);
        Ok(())
    }

    /// Stop recognition. Does nothing when not listening.
    pub fn stop_listening(&self) {
        let mut state = self.lock();
        if !state.listening {
            return;
        }
        if let Some(recognizer) = &self.recognizer {
            if let Err(e) = recognizer.stop() {
                warn!(error = %e, "Speech recognizer did not stop cleanly");
            }
        }
        state.listening = false;
        drop(state);

        info!("Listening stopped");
        self.publish_listening(false);
    }

    /// Start or stop recognition. Returns whether the engine is now listening.
    pub fn toggle_listening(&self) -> Result<bool, VoiceError> {
        if self.is_listening() {
            self.stop_listening();
            Ok(false)
        } else {
            self.start_listening()?;
            Ok(true)
        }
    }

    // =========================================================================
    // Synthesis
    // =========================================================================

    /// Re-run voice choice against the platform's current voices.
    pub fn select_default_voice(&self) -> Option<String> {
        let synthesizer = self.synthesizer.as_ref()?;
        let voices = synthesizer.voices();
        if voices.is_empty() {
            debug!("No voices loaded yet; waiting for the platform");
            return None;
        }
        let chosen = choose_voice(&voices, &self.config.preferred_voices);
        let name = chosen.as_ref().map(|v| v.name.clone());
        self.lock().selected_voice = chosen;
        info!(voice = ?name, "Voice selected");
        self.events.publish(DomainEvent::VoiceSelected {
            name: name.clone(),
            timestamp: Timestamp::now(),
        });
        name
    }

    /// Select a voice by exact name. Returns `false` when the platform has no
    /// such voice; the previous selection is kept.
    pub fn set_voice(&self, name: &str) -> bool {
        let Some(voice) = self
            .synthesizer
            .as_ref()
            .and_then(|s| s.voices().into_iter().find(|v| v.name == name))
        else {
            warn!(voice = name, "Requested voice is not available");
            return false;
        };
        self.lock().selected_voice = Some(voice);
        self.events.publish(DomainEvent::VoiceSelected {
            name: Some(name.to_string()),
            timestamp: Timestamp::now(),
        });
        true
    }

    /// The platform's voices, English first.
    pub fn available_voices(&self) -> VoiceGroups {
        self.synthesizer
            .as_ref()
            .map(|s| VoiceGroups::from_voices(s.voices()))
            .unwrap_or_default()
    }

    /// Speak `text` after stripping its formatting, cutting over anything
    /// already playing.
    ///
    /// Returns the id of the new utterance, or `None` when nothing is left to
    /// say once formatting is removed.
    pub fn speak(&self, text: &str) -> Result<Option<Uuid>, VoiceError> {
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or(VoiceError::Unsupported("voice output"))?;

        let spoken = speakable_text(text);
        if spoken.trim().is_empty() {
            return Ok(None);
        }

        if self.lock().selected_voice.is_none() {
            self.select_default_voice();
        }

        synthesizer.cancel();
        self.finish_current_utterance();

        let id = Uuid::new_v4();
        let utterance = {
            let mut state = self.lock();
            state.current_utterance = Some(id);
            Utterance {
                id,
                text: spoken,
                voice: state.selected_voice.as_ref().map(|v| v.name.clone()),
                rate: self.config.rate,
                pitch: self.config.pitch,
                volume: self.config.volume,
            }
        };

        debug!(%id, chars = utterance.text.len(), "Speaking");
        if let Err(e) = synthesizer.speak(utterance) {
            error!(%id, error = %e, "Speech synthesis failed to start");
            self.lock().current_utterance = None;
            self.events.publish(DomainEvent::UtteranceFailed {
                utterance_id: id,
                reason: e.to_string(),
                timestamp: Timestamp::now(),
            });
            return Err(e);
        }
        Ok(Some(id))
    }

    /// Cancel speech output.
    pub fn stop_speaking(&self) {
        if let Some(synthesizer) = &self.synthesizer {
            synthesizer.cancel();
        }
        self.finish_current_utterance();
    }

    /// End the active utterance on our side and report it, since a cancelled
    /// platform utterance may never call back.
    fn finish_current_utterance(&self) {
        let (previous, was_speaking) = {
            let mut state = self.lock();
            let previous = state.current_utterance.take();
            let was_speaking = std::mem::replace(&mut state.speaking, false);
            (previous, was_speaking)
        };
        if let Some(id) = previous {
            self.events.publish(DomainEvent::UtteranceEnded {
                utterance_id: id,
                timestamp: Timestamp::now(),
            });
        }
        if was_speaking {
            self.publish_speaking(false);
        }
    }

    // =========================================================================
    // Platform callbacks
    // =========================================================================

    /// Apply one platform callback.
    pub fn handle_signal(&self, signal: PlatformSignal) {
        match signal {
            PlatformSignal::RecognitionResult { segments } => {
                let text = accumulate_transcript(&segments);
                self.lock().transcript = text.clone();
                self.events.publish(DomainEvent::TranscriptUpdated {
                    text,
                    timestamp: Timestamp::now(),
                });
            }
            PlatformSignal::RecognitionEnded => self.recognition_finished(),
            PlatformSignal::RecognitionError(reason) => {
                error!(%reason, "Speech recognition error");
                self.recognition_finished();
            }
            PlatformSignal::UtteranceStarted(id) => {
                let started = {
                    let mut state = self.lock();
                    if state.current_utterance == Some(id) {
                        let changed = !state.speaking;
                        state.speaking = true;
                        Some(changed)
                    } else {
                        None
                    }
                };
                match started {
                    Some(changed) => {
                        self.events.publish(DomainEvent::UtteranceStarted {
                            utterance_id: id,
                            timestamp: Timestamp::now(),
                        });
                        if changed {
                            self.publish_speaking(true);
                        }
                    }
                    None => debug!(%id, "Ignoring start of a superseded utterance"),
                }
            }
            PlatformSignal::UtteranceEnded(id) => {
                if self.take_if_current(id) {
                    self.events.publish(DomainEvent::UtteranceEnded {
                        utterance_id: id,
                        timestamp: Timestamp::now(),
                    });
                    self.publish_speaking(false);
                } else {
                    debug!(%id, "Ignoring end of a superseded utterance");
                }
            }
            PlatformSignal::UtteranceError { id, reason } => {
                if self.take_if_current(id) {
                    error!(%id, %reason, "Speech synthesis error");
                    self.events.publish(DomainEvent::UtteranceFailed {
                        utterance_id: id,
                        reason,
                        timestamp: Timestamp::now(),
                    });
                    self.publish_speaking(false);
                } else {
                    debug!(%id, %reason, "Ignoring error of a superseded utterance");
                }
            }
            PlatformSignal::VoicesChanged => {
                let keep = {
                    let state = self.lock();
                    state.selected_voice.as_ref().is_some_and(|selected| {
                        self.synthesizer
                            .as_ref()
                            .is_some_and(|s| s.voices().contains(selected))
                    })
                };
                if !keep {
                    self.select_default_voice();
                }
            }
        }
    }

    /// Apply platform callbacks until every sender is dropped.
    pub async fn run_platform_signals(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<PlatformSignal>,
    ) {
        while let Some(signal) = rx.recv().await {
            self.handle_signal(signal);
        }
        debug!("Platform signal channel closed");
    }

    fn take_if_current(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        if state.current_utterance == Some(id) {
            state.current_utterance = None;
            state.speaking = false;
            true
        } else {
            false
        }
    }

    fn recognition_finished(&self) {
        let was_listening = std::mem::replace(&mut self.lock().listening, false);
        if was_listening {
            info!("Recognition ended");
            self.publish_listening(false);
        }
    }

    fn publish_listening(&self, listening: bool) {
        self.events.publish(DomainEvent::ListeningChanged {
            listening,
            timestamp: Timestamp::now(),
        });
    }

    fn publish_speaking(&self, speaking: bool) {
        self.events.publish(DomainEvent::SpeakingChanged {
            speaking,
            timestamp: Timestamp::now(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRecognizer, MockSynthesizer, SynthCall};
    use crate::platform::Segment;
    use tokio::sync::broadcast;

    fn engine_with(
        recognizer: Option<Arc<MockRecognizer>>,
        synthesizer: Option<Arc<MockSynthesizer>>,
    ) -> (VoiceEngine, broadcast::Receiver<DomainEvent>) {
        let events = EventBus::default();
        let rx = events.subscribe();
        let engine = VoiceEngine::new(
            recognizer.map(|r| r as Arc<dyn SpeechRecognizer>),
            synthesizer.map(|s| s as Arc<dyn SpeechSynthesizer>),
            events,
            &VoiceConfig::default(),
        );
        (engine, rx)
    }

    fn full_engine() -> (
        VoiceEngine,
        Arc<MockRecognizer>,
        Arc<MockSynthesizer>,
        broadcast::Receiver<DomainEvent>,
    ) {
        let recognizer = Arc::new(MockRecognizer::new());
        let synthesizer = Arc::new(MockSynthesizer::with_voices(vec![
            VoiceInfo::new("Thomas", "fr-FR"),
            VoiceInfo::new("Samantha", "en-US"),
        ]));
        let (engine, rx) = engine_with(Some(recognizer.clone()), Some(synthesizer.clone()));
        (engine, recognizer, synthesizer, rx)
    }

    fn drain(rx: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn names(events: &[DomainEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_name()).collect()
    }

    // =========================================================================
    // Recognition
    // =========================================================================

    #[test]
    fn test_toggle_listening_round_trip() {
        let (engine, recognizer, _, mut rx) = full_engine();

        assert!(engine.toggle_listening().unwrap());
        assert!(engine.is_listening());
        assert!(engine.toggle_listening().is_ok_and(|l| !l));
        assert!(!engine.is_listening());

        assert_eq!(recognizer.starts(), 1);
        assert_eq!(recognizer.stops(), 1);
        let events = drain(&mut rx);
        assert_eq!(names(&events), vec!["listening_changed", "listening_changed"]);
    }

    #[test]
    fn test_start_when_listening_is_noop() {
        let (engine, recognizer, _, mut rx) = full_engine();
        engine.start_listening().unwrap();
        engine.start_listening().unwrap();
        assert_eq!(recognizer.starts(), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (engine, recognizer, _, mut rx) = full_engine();
        engine.stop_listening();
        assert_eq!(recognizer.stops(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_recognizer_passes_configured_settings() {
        let (engine, recognizer, _, _rx) = full_engine();
        engine.start_listening().unwrap();
        let settings = recognizer.last_settings().unwrap();
        assert_eq!(settings.lang, "en-US");
        assert!(settings.continuous);
        assert!(settings.interim_results);
    }

    #[test]
    fn test_start_failure_leaves_engine_idle() {
        let recognizer = Arc::new(MockRecognizer::failing("microphone denied"));
        let (engine, mut rx) = engine_with(Some(recognizer), None);
        let err = engine.start_listening().unwrap_err();
        assert_eq!(err, VoiceError::Platform("microphone denied".into()));
        assert!(!engine.is_listening());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_listening_without_recognizer_is_unsupported() {
        let (engine, _rx) = engine_with(None, None);
        assert_eq!(
            engine.toggle_listening().unwrap_err(),
            VoiceError::Unsupported("voice input")
        );
    }

    #[test]
    fn test_transcript_accumulates_and_finalized_prefix_grows() {
        let (engine, _, _, mut rx) = full_engine();
        engine.start_listening().unwrap();
        drain(&mut rx);

        engine.handle_signal(PlatformSignal::RecognitionResult {
            segments: vec![Segment::interim("what is")],
        });
        engine.handle_signal(PlatformSignal::RecognitionResult {
            segments: vec![Segment::finalized("what is the capital")],
        });
        let finalized = engine.transcript();
        engine.handle_signal(PlatformSignal::RecognitionResult {
            segments: vec![
                Segment::finalized("what is the capital"),
                Segment::interim("of Ghana"),
            ],
        });

        assert_eq!(finalized, "what is the capital ");
        assert_eq!(engine.transcript(), "what is the capital of Ghana");
        assert!(engine.transcript().starts_with(&finalized));

        let texts: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::TranscriptUpdated { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 3);
    }

    #[test]
    fn test_restart_clears_transcript() {
        let (engine, _, _, _rx) = full_engine();
        engine.start_listening().unwrap();
        engine.handle_signal(PlatformSignal::RecognitionResult {
            segments: vec![Segment::finalized("old words")],
        });
        engine.stop_listening();
        engine.start_listening().unwrap();
        assert_eq!(engine.transcript(), "");
    }

    #[test]
    fn test_recognition_end_and_error_stop_listening() {
        let (engine, _, _, mut rx) = full_engine();
        engine.start_listening().unwrap();
        engine.handle_signal(PlatformSignal::RecognitionEnded);
        assert!(!engine.is_listening());

        engine.start_listening().unwrap();
        engine.handle_signal(PlatformSignal::RecognitionError("no-speech".into()));
        assert!(!engine.is_listening());

        // A late end after an explicit stop does not report twice.
        engine.handle_signal(PlatformSignal::RecognitionEnded);
        let listening: Vec<bool> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::ListeningChanged { listening, .. } => Some(listening),
                _ => None,
            })
            .collect();
        assert_eq!(listening, vec![true, false, true, false]);
    }

    // =========================================================================
    // Synthesis
    // =========================================================================

    #[test]
    fn test_speak_selects_voice_and_strips_formatting() {
        let (engine, _, synthesizer, _rx) = full_engine();
        let id = engine.speak("**Accra** is the *capital*").unwrap().unwrap();

        assert_eq!(engine.selected_voice().as_deref(), Some("Samantha"));
        let spoken = synthesizer.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].id, id);
        assert_eq!(spoken[0].text, "Accra is the capital");
        assert_eq!(spoken[0].voice.as_deref(), Some("Samantha"));
        assert!((spoken[0].rate - 1.1).abs() < f32::EPSILON);
        assert!((spoken[0].pitch - 1.0).abs() < f32::EPSILON);
        assert!((spoken[0].volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_speaking_flag_follows_platform_callbacks() {
        let (engine, _, _, mut rx) = full_engine();
        let id = engine.speak("Hello").unwrap().unwrap();
        assert!(!engine.is_speaking());
        assert_eq!(engine.current_utterance(), Some(id));

        engine.handle_signal(PlatformSignal::UtteranceStarted(id));
        assert!(engine.is_speaking());
        engine.handle_signal(PlatformSignal::UtteranceEnded(id));
        assert!(!engine.is_speaking());
        assert_eq!(engine.current_utterance(), None);

        let events = drain(&mut rx);
        assert_eq!(
            names(&events),
            vec![
                "voice_selected",
                "utterance_started",
                "speaking_changed",
                "utterance_ended",
                "speaking_changed"
            ]
        );
    }

    #[test]
    fn test_second_utterance_supersedes_first() {
        let (engine, _, synthesizer, mut rx) = full_engine();
        let first = engine.speak("First reply").unwrap().unwrap();
        engine.handle_signal(PlatformSignal::UtteranceStarted(first));
        let second = engine.speak("Second reply").unwrap().unwrap();
        engine.handle_signal(PlatformSignal::UtteranceStarted(second));

        // The platform reporting the first one late changes nothing.
        engine.handle_signal(PlatformSignal::UtteranceEnded(first));
        assert!(engine.is_speaking());

        let ended: Vec<Uuid> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::UtteranceEnded { utterance_id, .. } => Some(utterance_id),
                _ => None,
            })
            .collect();
        assert_eq!(ended, vec![first]);
        assert!(synthesizer
            .calls()
            .iter()
            .filter(|c| matches!(c, SynthCall::Cancel))
            .count()
            >= 2);
    }

    #[test]
    fn test_stop_speaking_reports_end() {
        let (engine, _, synthesizer, mut rx) = full_engine();
        let id = engine.speak("Long answer").unwrap().unwrap();
        engine.handle_signal(PlatformSignal::UtteranceStarted(id));
        drain(&mut rx);

        engine.stop_speaking();
        assert!(!engine.is_speaking());
        assert_eq!(
            names(&drain(&mut rx)),
            vec!["utterance_ended", "speaking_changed"]
        );
        assert!(matches!(synthesizer.calls().last(), Some(SynthCall::Cancel)));
    }

    #[test]
    fn test_utterance_error_ends_speaking() {
        let (engine, _, _, mut rx) = full_engine();
        let id = engine.speak("Hi").unwrap().unwrap();
        engine.handle_signal(PlatformSignal::UtteranceStarted(id));
        engine.handle_signal(PlatformSignal::UtteranceError {
            id,
            reason: "audio-busy".into(),
        });
        assert!(!engine.is_speaking());
        assert!(names(&drain(&mut rx)).contains(&"utterance_failed"));
    }

    #[test]
    fn test_speak_empty_after_stripping_is_skipped() {
        let (engine, _, synthesizer, _rx) = full_engine();
        assert_eq!(engine.speak("** **").unwrap(), None);
        assert!(synthesizer.spoken().is_empty());
    }

    #[test]
    fn test_speak_without_synthesizer_is_unsupported() {
        let (engine, _rx) = engine_with(None, None);
        assert_eq!(
            engine.speak("Hello").unwrap_err(),
            VoiceError::Unsupported("voice output")
        );
    }

    #[test]
    fn test_speak_failure_is_reported() {
        let synthesizer = Arc::new(MockSynthesizer::failing("no audio device"));
        let (engine, mut rx) = engine_with(None, Some(synthesizer));
        assert!(engine.speak("Hello").is_err());
        assert!(names(&drain(&mut rx)).contains(&"utterance_failed"));
        assert!(!engine.is_speaking());
    }

    #[test]
    fn test_set_voice() {
        let (engine, _, _, _rx) = full_engine();
        assert!(engine.set_voice("Thomas"));
        assert_eq!(engine.selected_voice().as_deref(), Some("Thomas"));
        assert!(!engine.set_voice("Nobody"));
        assert_eq!(engine.selected_voice().as_deref(), Some("Thomas"));
    }

    #[test]
    fn test_voices_changed_selects_when_none_loaded_before() {
        let synthesizer = Arc::new(MockSynthesizer::with_voices(Vec::new()));
        let (engine, _rx) = engine_with(None, Some(synthesizer.clone()));
        assert_eq!(engine.select_default_voice(), None);

        synthesizer.set_voices(vec![VoiceInfo::new("Google US English", "en-US")]);
        engine.handle_signal(PlatformSignal::VoicesChanged);
        assert_eq!(engine.selected_voice().as_deref(), Some("Google US English"));
    }

    #[test]
    fn test_voices_changed_keeps_manual_choice() {
        let (engine, _, synthesizer, _rx) = full_engine();
        assert!(engine.set_voice("Thomas"));
        synthesizer.set_voices(vec![
            VoiceInfo::new("Thomas", "fr-FR"),
            VoiceInfo::new("Alex", "en-US"),
        ]);
        engine.handle_signal(PlatformSignal::VoicesChanged);
        assert_eq!(engine.selected_voice().as_deref(), Some("Thomas"));
    }

    #[test]
    fn test_available_voices_grouped() {
        let (engine, _, _, _rx) = full_engine();
        let groups = engine.available_voices();
        assert_eq!(groups.english[0].name, "Samantha");
        assert_eq!(groups.other[0].name, "Thomas");
    }

    #[test]
    fn test_auto_speak_toggle() {
        let (engine, _, _, _rx) = full_engine();
        assert!(!engine.auto_speak());
        assert!(engine.toggle_auto_speak());
        assert!(!engine.toggle_auto_speak());
        engine.set_auto_speak(true);
        assert!(engine.auto_speak());
    }

    // =========================================================================
    // Compatibility notice
    // =========================================================================

    #[test]
    fn test_compatibility_notice_shown_once() {
        let (engine, mut rx) = engine_with(None, Some(Arc::new(MockSynthesizer::new())));
        assert!(engine.compatibility_notice().is_some());
        assert!(engine.compatibility_notice().is_none());

        match drain(&mut rx).as_slice() {
            [DomainEvent::NoticeShown {
                text,
                dismiss_after_ms,
                ..
            }] => {
                assert!(text.starts_with("Voice features (voice input)"));
                assert_eq!(*dismiss_after_ms, 10_000);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn test_compatibility_notice_names_both_features() {
        let (engine, mut rx) = engine_with(None, None);
        engine.compatibility_notice();
        match drain(&mut rx).first() {
            Some(DomainEvent::NoticeShown { text, .. }) => {
                assert!(text.contains("voice input and voice output"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_no_notice_when_fully_supported() {
        let (engine, _, _, _rx) = full_engine();
        assert!(engine.capabilities().is_complete());
        assert!(engine.compatibility_notice().is_none());
    }

    #[tokio::test]
    async fn test_signal_pump_applies_callbacks() {
        let (engine, _, _, _rx) = full_engine();
        let engine = Arc::new(engine);
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(engine.clone().run_platform_signals(rx));

        engine.start_listening().unwrap();
        tx.send(PlatformSignal::RecognitionResult {
            segments: vec![Segment::finalized("hello")],
        })
        .unwrap();
        tx.send(PlatformSignal::RecognitionEnded).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(engine.transcript(), "hello ");
        assert!(!engine.is_listening());
    }
}
