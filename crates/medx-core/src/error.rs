//! # Error Types
//!
//! Error types for medx-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  medx-core errors (this file)                                          │
//! │  ├── CoreError        - General error wrapper                          │
//! │  ├── ConfigIssue      - Why the env file cannot start services         │
//! │  └── ValidationError  - Setup form input failures                      │
//! │                                                                         │
//! │  medx-supervisor errors (separate crate)                               │
//! │  └── SupervisorError  - Process, file, socket, print failures          │
//! │                                                                         │
//! │  Desktop API errors (in app)                                           │
//! │  └── ApiError         - What the UI sees (serialized)                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SupervisorError → ApiError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors produced by pure shell logic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The connection configuration cannot be used to start services.
    #[error("Configuration incomplete: {0}")]
    Config(#[from] ConfigIssue),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Config Issue
// =============================================================================

/// Reason a `DATABASE_URL` / `SECRET_KEY` pair is not usable.
///
/// The first failing rule is reported; callers that only need a yes/no
/// answer use [`crate::env::is_connection_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    /// `DATABASE_URL` is missing or blank.
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    /// `SECRET_KEY` is missing or blank.
    #[error("SECRET_KEY is not set")]
    MissingSecretKey,

    /// A value still carries the placeholder written on first run.
    #[error("{key} still contains the placeholder value")]
    Placeholder { key: String },

    /// The URL parsed but names no database.
    #[error("DATABASE_URL does not name a database")]
    MissingDatabaseName,

    /// The URL parsed but names no user.
    #[error("DATABASE_URL does not name a user")]
    MissingUser,

    /// The secret is shorter than the backend accepts.
    #[error("SECRET_KEY must be at least {min} characters (got {len})")]
    SecretTooShort { len: usize, min: usize },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for forms submitted by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., placeholder text left in a field).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
