//! # API Error Type
//!
//! Unified error type for Tauri commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the MedX Shell                         │
//! │                                                                         │
//! │  UI                          Rust Shell                                 │
//! │  ──                          ──────────                                 │
//! │                                                                         │
//! │  invoke('save_config', { form })                                        │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Form invalid? ─── ValidationError ──────────── ApiError ──────►│  │
//! │  │         │                                        ▲              │  │
//! │  │         ▼                                        │              │  │
//! │  │  Engine failed? ── SupervisorError ──────────────┘              │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Promise rejected with                                                  │
//! │    { "code": "VALIDATION_ERROR", "message": "db is required" }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use medx_core::{ConfigIssue, CoreError, ValidationError};
use medx_supervisor::SupervisorError;

/// API error returned from Tauri commands.
///
/// ## Serialization
/// This is what the UI receives when a command fails:
/// ```json
/// {
///   "code": "VALIDATION_ERROR",
///   "message": "secretKey must be at least 24 characters"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed
    ValidationError,

    /// The env file cannot be used to start services
    ConfigInvalid,

    /// A service could not be started
    ServiceError,

    /// A print job could not be run
    PrintError,

    /// The OS refused to open a folder or URL
    HostError,

    /// The supervisor is gone (shell shutting down)
    Unavailable,

    /// Internal error
    Internal,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

/// Converts supervisor errors to API errors.
impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::ConnectionInvalid(issue) => issue.into(),
            SupervisorError::Validation(e) => e.into(),
            SupervisorError::BackendMissing { .. } | SupervisorError::SpawnFailed { .. } => {
                ApiError::new(ErrorCode::ServiceError, err.to_string())
            }
            SupervisorError::PrintFailed(_)
            | SupervisorError::PrintTimeout(_)
            | SupervisorError::SurfaceFailed(_) => {
                ApiError::new(ErrorCode::PrintError, err.to_string())
            }
            SupervisorError::ShuttingDown | SupervisorError::ChannelError(_) => {
                ApiError::new(ErrorCode::Unavailable, err.to_string())
            }
            SupervisorError::InvalidConfig(_)
            | SupervisorError::ConfigLoadFailed(_)
            | SupervisorError::ConfigSaveFailed(_)
            | SupervisorError::ChildFailed(_)
            | SupervisorError::Io(_) => {
                tracing::error!(error = %err, "Shell engine error");
                ApiError::internal(err.to_string())
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<ConfigIssue> for ApiError {
    fn from(err: ConfigIssue) -> Self {
        ApiError::new(ErrorCode::ConfigInvalid, err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(issue) => issue.into(),
            CoreError::Validation(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use medx_core::ServiceRole;

    #[test]
    fn test_error_serialization() {
        let err = ApiError::validation("db is required");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["message"], "db is required");
    }

    #[test]
    fn test_supervisor_error_mapping() {
        let err: ApiError = SupervisorError::SpawnFailed {
            role: ServiceRole::Backend,
            message: "denied".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ServiceError);

        let err: ApiError = SupervisorError::ConnectionInvalid(ConfigIssue::MissingSecretKey).into();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);

        let err: ApiError = SupervisorError::ShuttingDown.into();
        assert_eq!(err.code, ErrorCode::Unavailable);
    }
}
