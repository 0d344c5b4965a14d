//! Voice choice and listing.

use crate::platform::{Segment, VoiceInfo};

/// Pick the voice to speak with.
///
/// Order: the first name in `preferred` that the platform offers, then an
/// English voice with "Google" in its name, then the first English voice.
/// `None` leaves the platform default in place.
pub fn choose_voice(voices: &[VoiceInfo], preferred: &[String]) -> Option<VoiceInfo> {
    for name in preferred {
        if let Some(voice) = voices.iter().find(|v| &v.name == name) {
            return Some(voice.clone());
        }
    }

    let mut english = voices.iter().filter(|v| v.is_english());
    if let Some(google) = english.clone().find(|v| v.name.contains("Google")) {
        return Some(google.clone());
    }
    english.next().cloned()
}

/// Voices split for display, each group keeping the platform's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceGroups {
    pub english: Vec<VoiceInfo>,
    pub other: Vec<VoiceInfo>,
}

impl VoiceGroups {
    pub fn from_voices(voices: Vec<VoiceInfo>) -> Self {
        let (english, other) = voices.into_iter().partition(|v| v.is_english());
        Self { english, other }
    }

    /// English voices first, then everything else.
    pub fn iter(&self) -> impl Iterator<Item = &VoiceInfo> {
        self.english.iter().chain(self.other.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.english.is_empty() && self.other.is_empty()
    }
}

/// Running transcript: every final segment followed by a space, then the
/// interim segments.
pub fn accumulate_transcript(segments: &[Segment]) -> String {
    let mut finals = String::new();
    let mut interim = String::new();
    for segment in segments {
        if segment.is_final {
            finals.push_str(&segment.transcript);
            finals.push(' ');
        } else {
            interim.push_str(&segment.transcript);
        }
    }
    finals + &interim
}
