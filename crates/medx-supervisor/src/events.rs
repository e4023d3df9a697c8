//! # Shell Events
//!
//! Notifications the engine raises for the UI layer. The desktop app
//! acts on them and emits them to the UI; tests record them.

use std::path::PathBuf;

use serde::Serialize;

use medx_core::{ServiceRole, ServiceStatus};

/// Something the user or the main window has to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ShellEvent {
    /// The env file is not usable; open the setup wizard.
    #[serde(rename_all = "camelCase")]
    SetupRequired {
        env_path: PathBuf,
        reason: Option<String>,
    },

    /// A service could not be started at all.
    #[serde(rename_all = "camelCase")]
    FatalError { title: String, message: String },

    /// A service keeps crashing; automatic restarts are suspended.
    #[serde(rename_all = "camelCase")]
    CrashLoop {
        role: ServiceRole,
        log_dir: PathBuf,
        config_dir: PathBuf,
    },

    /// A role changed state.
    ServiceStatus(ServiceStatus),

    /// An external update finished (or failed) and services were restarted.
    UpdateFinished { success: bool },

    /// The main window should reload its content.
    ReloadMainWindow,

    /// The main window should be shown if it is still hidden.
    ShowMainWindow,
}

/// Trait for emitting shell events to the UI.
pub trait ShellEvents: Send + Sync {
    fn emit(&self, event: ShellEvent);
}

/// No-op event emitter for headless runs and tests.
pub struct NoOpEvents;

impl ShellEvents for NoOpEvents {
    fn emit(&self, _event: ShellEvent) {}
}
