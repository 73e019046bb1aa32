//! Error types for NMI triage.

use thiserror::Error;

use crate::id::SourceType;

/// Result type alias for NMI triage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type surfaced at startup and by the CLI.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    // Registration errors (20-29)
    #[error("unable to register handler for {source_type}: {reason}")]
    Registration { source_type: SourceType, reason: String },

    #[error("engine already installed")]
    AlreadyInstalled,

    #[error("NMI source {source_type} not supported by the {backend} backend")]
    UnsupportedSource {
        source_type: SourceType,
        backend: String,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    /// Used for detailed error reporting in JSON output.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::SchemaValidation(_) => 12,
            Error::Registration { .. } => 20,
            Error::AlreadyInstalled => 21,
            Error::UnsupportedSource { .. } => 22,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Registration failures abort startup; configuration problems do not.
    pub fn is_registration(&self) -> bool {
        (20..30).contains(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_family() {
        let err = Error::Registration {
            source_type: SourceType::SystemError,
            reason: "busy".to_string(),
        };
        assert_eq!(err.code(), 20);
        assert!(err.is_registration());
        assert!(!Error::Config("x".to_string()).is_registration());
    }

    #[test]
    fn registration_message_names_source() {
        let err = Error::Registration {
            source_type: SourceType::IoCheck,
            reason: "busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unable to register handler for io_check: busy"
        );
    }
}
