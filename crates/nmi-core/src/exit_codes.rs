//! Exit codes for the nmimgr CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.

/// Exit codes for nmimgr operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Everything parsed and ran as configured
    Clean = 0,

    /// At least one reason-code list was rejected; the rest are active
    ConfigDegraded = 1,

    /// A simulated event resolved to a halt that was not carried out
    HaltWithheld = 2,

    /// A simulated event arrived on a source the manager did not bind
    NotDelivered = 3,

    /// Configuration error (unreadable or invalid config)
    ConfigError = 10,

    /// Host refused to bind a source; nothing left bound
    RegistrationError = 11,

    /// I/O error
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::ConfigDegraded | ExitCode::HaltWithheld)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    pub fn from_error(err: &nmi_common::Error) -> Self {
        use nmi_common::Error;
        match err {
            Error::Config(_) | Error::SchemaValidation(_) => ExitCode::ConfigError,
            Error::Registration { .. } | Error::AlreadyInstalled | Error::UnsupportedSource { .. } => {
                ExitCode::RegistrationError
            }
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nmi_common::{Error, SourceType};

    #[test]
    fn success_and_error_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::HaltWithheld.is_success());
        assert!(!ExitCode::NotDelivered.is_success());
        assert!(!ExitCode::NotDelivered.is_error());
        assert!(!ExitCode::ConfigError.is_success());
        assert!(ExitCode::RegistrationError.is_error());
        assert_eq!(i32::from(ExitCode::InternalError), 99);
    }

    #[test]
    fn registration_errors_map_to_registration_exit() {
        let err = Error::Registration {
            source_type: SourceType::Unknown,
            reason: "busy".to_string(),
        };
        assert_eq!(ExitCode::from_error(&err), ExitCode::RegistrationError);
        assert_eq!(
            ExitCode::from_error(&Error::Config("x".to_string())),
            ExitCode::ConfigError
        );
    }

    #[test]
    fn config_families_keep_their_exit_codes() {
        assert_eq!(
            ExitCode::from_error(&Error::SchemaValidation("2.0.0".to_string())),
            ExitCode::ConfigError
        );
        let io = Error::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(ExitCode::from_error(&io), ExitCode::IoError);
        let json = serde_json::from_str::<u8>("x").unwrap_err();
        assert_eq!(ExitCode::from_error(&Error::Json(json)), ExitCode::InternalError);
    }
}
