//! Error types for speech input and output.

use kiki_core::error::KikiError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    /// The named feature has no platform engine.
    #[error("{0} is not supported on this system")]
    Unsupported(&'static str),
    /// The platform engine refused or failed an operation.
    #[error("speech platform error: {0}")]
    Platform(String),
}

impl From<VoiceError> for KikiError {
    fn from(err: VoiceError) -> Self {
        KikiError::Voice(err.to_string())
    }
}

impl From<std::io::Error> for VoiceError {
    fn from(err: std::io::Error) -> Self {
        VoiceError::Platform(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_error_display() {
        assert_eq!(
            VoiceError::Unsupported("voice input").to_string(),
            "voice input is not supported on this system"
        );
        assert_eq!(
            VoiceError::Platform("device busy".into()).to_string(),
            "speech platform error: device busy"
        );
    }

    #[test]
    fn test_voice_error_into_kiki_error() {
        let err: KikiError = VoiceError::Unsupported("voice output").into();
        assert!(matches!(err, KikiError::Voice(_)));
        assert!(err.to_string().contains("voice output"));
    }
}
