//! # Supervisor Error Types
//!
//! Error types for the shell engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Supervisor Error Categories                         │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Processes     │  │     Printing            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  BackendMissing │  │  PrintFailed            │ │
//! │  │  Connection     │  │  SpawnFailed    │  │  PrintTimeout           │ │
//! │  │  Validation     │  │  ChildWait      │  │  SurfaceFailed          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Filesystem    │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Io             │  │  ChannelError   │                              │
//! │  │  ConfigLoad/Save│  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant carries owned strings so the error is `Clone`; a start
//! result is shared between concurrent callers.

use std::path::PathBuf;

use medx_core::{ConfigIssue, ServiceRole, ValidationError};
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Supervisor error type covering every engine failure.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid shell configuration.
    #[error("Invalid shell configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the shell config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save the shell config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// The env file does not hold a usable connection.
    #[error("Database connection is not configured: {0}")]
    ConnectionInvalid(#[from] ConfigIssue),

    /// The setup form was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Process Errors
    // =========================================================================
    /// The bundled backend executable is not where it should be.
    #[error("Backend executable not found: {}", path.display())]
    BackendMissing { path: PathBuf },

    /// The OS refused to start a child.
    #[error("Failed to start {role}: {message}")]
    SpawnFailed { role: ServiceRole, message: String },

    /// Waiting on or killing a child failed.
    #[error("Child process error: {0}")]
    ChildFailed(String),

    // =========================================================================
    // Print Errors
    // =========================================================================
    /// The host reported a failed print job.
    #[error("Print failed: {0}")]
    PrintFailed(String),

    /// The host never signalled completion.
    #[error("Print did not complete within {0} ms")]
    PrintTimeout(u64),

    /// The offscreen surface could not load or measure the document.
    #[error("Print surface error: {0}")]
    SurfaceFailed(String),

    // =========================================================================
    // Filesystem & Internal Errors
    // =========================================================================
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The supervisor loop has stopped.
    #[error("Supervisor is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SupervisorError {
    fn from(err: std::io::Error) -> Self {
        SupervisorError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SupervisorError {
    fn from(err: toml::de::Error) -> Self {
        SupervisorError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SupervisorError {
    fn from(err: toml::ser::Error) -> Self {
        SupervisorError::ConfigSaveFailed(err.to_string())
    }
}

impl From<medx_core::CoreError> for SupervisorError {
    fn from(err: medx_core::CoreError) -> Self {
        match err {
            medx_core::CoreError::Config(issue) => SupervisorError::ConnectionInvalid(issue),
            medx_core::CoreError::Validation(e) => SupervisorError::Validation(e),
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SupervisorError {
    /// Returns true if the operation may succeed when tried again.
    ///
    /// ## Retryable Errors
    /// - Filesystem errors (files briefly locked by the updater or AV)
    /// - Child wait/kill failures
    pub fn is_retryable(&self) -> bool {
        matches!(self, SupervisorError::Io(_) | SupervisorError::ChildFailed(_))
    }

    /// Returns true if this error means the user has to fix configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::InvalidConfig(_)
                | SupervisorError::ConfigLoadFailed(_)
                | SupervisorError::ConnectionInvalid(_)
                | SupervisorError::Validation(_)
        )
    }

    /// Returns true if this error should be shown to the user as fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SupervisorError::BackendMissing { .. } | SupervisorError::SpawnFailed { .. }
        )
    }
}
