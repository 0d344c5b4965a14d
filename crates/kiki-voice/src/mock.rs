//! Scripted platform engines for tests and headless runs.
//!
//! Neither mock produces callbacks on its own; drive the engine with
//! [`crate::VoiceEngine::handle_signal`] to simulate the platform.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::VoiceError;
use crate::platform::{
    RecognitionSettings, SpeechRecognizer, SpeechSynthesizer, Utterance, VoiceInfo,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recognizer that records start/stop requests.
#[derive(Debug, Default)]
pub struct MockRecognizer {
    failure: Option<String>,
    settings: Mutex<Vec<RecognitionSettings>>,
    stops: Mutex<usize>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recognizer whose `start` always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        lock(&self.settings).len()
    }

    pub fn stops(&self) -> usize {
        *lock(&self.stops)
    }

    pub fn last_settings(&self) -> Option<RecognitionSettings> {
        lock(&self.settings).last().cloned()
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&self, settings: &RecognitionSettings) -> Result<(), VoiceError> {
        if let Some(reason) = &self.failure {
            return Err(VoiceError::Platform(reason.clone()));
        }
        lock(&self.settings).push(settings.clone());
        Ok(())
    }

    fn stop(&self) -> Result<(), VoiceError> {
        *lock(&self.stops) += 1;
        Ok(())
    }
}

/// A request received by [`MockSynthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    Speak(Utterance),
    Cancel,
}

/// Synthesizer with a settable voice list that records every request.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    failure: Option<String>,
    voices: Mutex<Vec<VoiceInfo>>,
    calls: Mutex<Vec<SynthCall>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<VoiceInfo>) -> Self {
        Self {
            voices: Mutex::new(voices),
            ..Self::default()
        }
    }

    /// A synthesizer whose `speak` always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Replace the voice list, as a platform does when voices finish loading.
    pub fn set_voices(&self, voices: Vec<VoiceInfo>) {
        *lock(&self.voices) = voices;
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        lock(&self.calls).clone()
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                SynthCall::Speak(u) => Some(u.clone()),
                SynthCall::Cancel => None,
            })
            .collect()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn voices(&self) -> Vec<VoiceInfo> {
        lock(&self.voices).clone()
    }

    fn speak(&self, utterance: Utterance) -> Result<(), VoiceError> {
        if let Some(reason) = &self.failure {
            return Err(VoiceError::Platform(reason.clone()));
        }
        lock(&self.calls).push(SynthCall::Speak(utterance));
        Ok(())
    }

    fn cancel(&self) {
        lock(&self.calls).push(SynthCall::Cancel);
    }
}
