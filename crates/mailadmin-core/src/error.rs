//! Error types for directory administration operations.
//!
//! Directory failures are kept apart by kind (missing entries, denied access, transport problems,
//! rejected input) so callers never have to guess what a `false` meant.

use serde::Serialize;
use thiserror::Error;

/// Reasons a password change can be refused.
///
/// The first three are detected locally before the directory is contacted; the last two are
/// mapped from the directory's answer to the password modify operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChangeError {
    /// Current password was empty.
    #[error("current password is empty")]
    EmptyCurrentPassword,
    /// New password or its confirmation was empty.
    #[error("new password is empty")]
    EmptyNewPassword,
    /// New password and confirmation differ.
    #[error("new password and confirmation do not match")]
    NewPasswordMismatch,
    /// The directory could not verify the old password.
    #[error("old password is incorrect")]
    BadOldPassword,
    /// The directory refused the operation for another reason.
    #[error("directory is unwilling to perform the password change")]
    UnwillingToPerform,
}

impl PasswordChangeError {
    /// Returns the symbolic code understood by the presentation layer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptyCurrentPassword => "EMPTY_CUR_PW",
            Self::EmptyNewPassword => "EMPTY_NEW_PW",
            Self::NewPasswordMismatch => "NEW_PW_NOT_SAME",
            Self::BadOldPassword => "BAD_OLD_PASSWD",
            Self::UnwillingToPerform => "UNWILLING_TO_PERFORM",
        }
    }
}

/// Main error type for directory administration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Directory entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the privilege for the operation
    #[error("Permission denied: {0}")]
    Unauthorized(String),

    /// Connection, TLS or protocol level failure talking to the directory
    #[error("Directory transport error: {service}: {message}")]
    Transport {
        /// Service that failed
        service: String,
        /// Error message
        message: String,
    },

    /// Input rejected before reaching the directory
    #[error("Validation error: {0}")]
    Validation(String),

    /// Password change refused
    #[error("Password change failed: {0}")]
    PasswordChange(PasswordChangeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed distinguished name
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Specialized result type for directory administration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for serialization.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Optional request ID for tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail structure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDetail {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Password change failures return their own symbolic code (e.g. `BAD_OLD_PASSWD`).
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "PERMISSION_DENIED",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PasswordChange(reason) => reason.code(),
            Self::Config(_) => "CONFIG_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }

    /// Builds a transport error for the directory service.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            service: "ldap".to_string(),
            message: message.into(),
        }
    }

    /// Converts the error into an `ErrorResponse`.
    #[must_use]
    pub fn into_error_response(self) -> ErrorResponse {
        self.into_error_response_with_id(None)
    }

    /// Converts the error into an `ErrorResponse` with a request ID.
    #[must_use]
    pub fn into_error_response_with_id(self, request_id: Option<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
            request_id,
        }
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Transport { .. })
    }
}

impl From<PasswordChangeError> for Error {
    fn from(err: PasswordChangeError) -> Self {
        Self::PasswordChange(err)
    }
}

// Conversions from external error types
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid directory URI: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::NotFound("x".to_string()).error_code(), "NOT_FOUND");
        assert_eq!(
            Error::Unauthorized("x".to_string()).error_code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(Error::transport("down").error_code(), "TRANSPORT_ERROR");
        assert_eq!(
            Error::Validation("x".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(Error::Config("x".to_string()).error_code(), "CONFIG_ERROR");
        assert_eq!(Error::Timeout("x".to_string()).error_code(), "TIMEOUT");
        assert_eq!(Error::InvalidDn("x".to_string()).error_code(), "INVALID_DN");
        assert_eq!(
            Error::NotImplemented("x".to_string()).error_code(),
            "NOT_IMPLEMENTED"
        );
    }

    #[test]
    fn test_password_change_codes() {
        let cases = [
            (PasswordChangeError::EmptyCurrentPassword, "EMPTY_CUR_PW"),
            (PasswordChangeError::EmptyNewPassword, "EMPTY_NEW_PW"),
            (PasswordChangeError::NewPasswordMismatch, "NEW_PW_NOT_SAME"),
            (PasswordChangeError::BadOldPassword, "BAD_OLD_PASSWD"),
            (PasswordChangeError::UnwillingToPerform, "UNWILLING_TO_PERFORM"),
        ];

        for (reason, code) in cases {
            assert_eq!(Error::from(reason).error_code(), code);
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::transport("connection refused");
        assert_eq!(
            err.to_string(),
            "Directory transport error: ldap: connection refused"
        );

        let err = Error::PasswordChange(PasswordChangeError::BadOldPassword);
        assert_eq!(
            err.to_string(),
            "Password change failed: old password is incorrect"
        );
    }

    #[test]
    fn test_into_error_response() {
        let err = Error::PasswordChange(PasswordChangeError::NewPasswordMismatch);
        let response = err.clone().into_error_response();

        assert_eq!(response.error.code, "NEW_PW_NOT_SAME");
        assert!(response.request_id.is_none());

        let response_with_id = err.into_error_response_with_id(Some("req-1".to_string()));
        assert_eq!(response_with_id.request_id, Some("req-1".to_string()));
    }

    #[test]
    fn test_error_response_serialization_no_request_id() {
        let response = Error::NotFound("domainName=example.com".to_string()).into_error_response();

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("NOT_FOUND"));
        assert!(!json.contains("request_id"));
    }

    #[test]
    fn test_should_log() {
        assert!(Error::transport("down").should_log());
        assert!(Error::Config("bad".to_string()).should_log());

        assert!(!Error::NotFound("x".to_string()).should_log());
        assert!(!Error::Unauthorized("x".to_string()).should_log());
        assert!(!Error::PasswordChange(PasswordChangeError::BadOldPassword).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a uri").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::Config(_)));
    }
}
