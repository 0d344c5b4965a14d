//! Speech input and output for the Kiki client.

pub mod command;
pub mod engine;
pub mod error;
pub mod mock;
pub mod platform;
pub mod voices;

pub use command::{CommandFlavor, CommandSynthesizer};
pub use engine::{Capabilities, VoiceEngine};
pub use error::VoiceError;
pub use mock::{MockRecognizer, MockSynthesizer, SynthCall};
pub use platform::{
    PlatformSignal, RecognitionSettings, Segment, SpeechRecognizer, SpeechSynthesizer, Utterance,
    VoiceInfo,
};
pub use voices::{accumulate_transcript, choose_voice, VoiceGroups};
