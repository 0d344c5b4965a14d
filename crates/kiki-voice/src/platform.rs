//! Platform speech engine seams.
//!
//! Engines are fire-and-forget: `start`, `speak` and friends return as soon
//! as the request is accepted, and everything that happens afterwards is
//! reported as a [`PlatformSignal`] on the channel the engine was built with.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VoiceError;

/// A synthesis voice offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP 47 style language tag, e.g. `en-US`.
    pub lang: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }

    pub fn is_english(&self) -> bool {
        self.lang.to_ascii_lowercase().starts_with("en")
    }
}

/// How recognition should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
}

/// One recognised stretch of speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub transcript: String,
    pub is_final: bool,
}

impl Segment {
    pub fn finalized(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }

    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }
}

/// A request to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    /// `None` speaks with the platform default voice.
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Something a platform engine reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformSignal {
    /// Every segment recognised since the recognition session began.
    RecognitionResult { segments: Vec<Segment> },
    /// Recognition stopped (pause detected, or after `stop`).
    RecognitionEnded,
    RecognitionError(String),
    UtteranceStarted(Uuid),
    UtteranceEnded(Uuid),
    UtteranceError { id: Uuid, reason: String },
    /// The set of synthesis voices changed.
    VoicesChanged,
}

/// Speech-to-text engine.
pub trait SpeechRecognizer: Send + Sync {
    fn start(&self, settings: &RecognitionSettings) -> Result<(), VoiceError>;
    fn stop(&self) -> Result<(), VoiceError>;
}

/// Text-to-speech engine. At most one utterance plays at a time.
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<VoiceInfo>;
    fn speak(&self, utterance: Utterance) -> Result<(), VoiceError>;
    /// Stop whatever is playing. No end signal is required for a cancelled utterance.
    fn cancel(&self);
}
