//! Error types for the conversation session.

use kiki_core::error::{KikiError, ValidationError};

/// Why a session operation did nothing.
///
/// Backend failures are not errors at this level: they become bot replies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("a message is already being sent")]
    SendPending,
    #[error("an upload is already in progress")]
    UploadPending,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<ChatError> for KikiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::SendPending => KikiError::Busy("chat"),
            ChatError::UploadPending => KikiError::Busy("upload"),
            ChatError::Validation(v) => KikiError::Validation(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(
            ChatError::SendPending.to_string(),
            "a message is already being sent"
        );
        assert_eq!(
            ChatError::UploadPending.to_string(),
            "an upload is already in progress"
        );
        assert_eq!(
            ChatError::Validation(ValidationError::MissingFile).to_string(),
            "Please select a file"
        );
    }

    #[test]
    fn test_chat_error_into_kiki_error() {
        let err: KikiError = ChatError::SendPending.into();
        assert!(matches!(err, KikiError::Busy("chat")));

        let err: KikiError = ChatError::Validation(ValidationError::EmptyMessage).into();
        assert!(matches!(
            err,
            KikiError::Validation(ValidationError::EmptyMessage)
        ));
    }
}
