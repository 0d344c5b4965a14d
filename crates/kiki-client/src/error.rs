//! Error types for backend calls.

use kiki_core::error::KikiError;

/// Failure of a single backend request.
///
/// `Reported` carries the backend's own error text and is shown verbatim.
/// `Transport` covers everything else: the server was unreachable, answered
/// with a non-2xx status and no readable payload, or sent something that is
/// not the expected JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Reported(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn is_reported(&self) -> bool {
        matches!(self, ClientError::Reported(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<ClientError> for KikiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Reported(msg) => KikiError::Reported(msg),
            ClientError::Transport(msg) => KikiError::Transport(msg),
        }
    }
}
