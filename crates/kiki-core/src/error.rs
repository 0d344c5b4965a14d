use thiserror::Error;

/// Input rejected before any request leaves the client.
///
/// The display text is the notice shown to the user; the state that produced
/// it never transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a question first")]
    EmptyQuery,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Please enter a URL")]
    EmptyUrl,

    #[error("URL must start with http:// or https://")]
    MalformedUrl(String),

    #[error("Please select a file")]
    MissingFile,

    #[error("Please provide both a question and a {what}")]
    MissingSource { what: &'static str },

    #[error("Please select a supported file type: {supported}")]
    UnsupportedFileType {
        name: String,
        supported: &'static str,
    },
}

/// Top-level error type for Kiki.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for KikiError` so `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KikiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The backend answered with an explicit failure payload.
    #[error("Backend reported: {0}")]
    Reported(String),

    /// The backend could not be reached or answered with something unreadable.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Request already pending: {0}")]
    Busy(&'static str),

    #[error("Voice error: {0}")]
    Voice(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for KikiError {
    fn from(err: toml::de::Error) -> Self {
        KikiError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for KikiError {
    fn from(err: toml::ser::Error) -> Self {
        KikiError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for KikiError {
    fn from(err: serde_json::Error) -> Self {
        KikiError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Kiki operations.
pub type Result<T> = std::result::Result<T, KikiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KikiError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_validation_messages_match_user_notices() {
        assert_eq!(
            ValidationError::EmptyQuery.to_string(),
            "Please enter a question first"
        );
        assert_eq!(
            ValidationError::MalformedUrl("ftp://example.com".into()).to_string(),
            "URL must start with http:// or https://"
        );
        assert_eq!(
            ValidationError::MissingSource { what: "file" }.to_string(),
            "Please provide both a question and a file"
        );
        let err = ValidationError::UnsupportedFileType {
            name: "notes.txt".into(),
            supported: "PDF or CSV",
        };
        assert_eq!(
            err.to_string(),
            "Please select a supported file type: PDF or CSV"
        );
    }

    #[test]
    fn test_validation_converts_into_kiki_error() {
        let err: KikiError = ValidationError::EmptyMessage.into();
        assert!(matches!(err, KikiError::Validation(ValidationError::EmptyMessage)));
        assert_eq!(err.to_string(), "Validation error: Message cannot be empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KikiError = io_err.into();
        assert!(matches!(err, KikiError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let kiki_err: KikiError = err.unwrap_err().into();
        assert!(matches!(kiki_err, KikiError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let kiki_err: KikiError = err.unwrap_err().into();
        assert!(matches!(kiki_err, KikiError::Serialization(_)));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = KikiError::InvalidTransition {
            from: "AwaitingQuery".into(),
            to: "ShowingResult".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition: AwaitingQuery -> ShowingResult"
        );
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
