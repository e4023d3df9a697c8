//! # Host Adapters
//!
//! Concrete implementations of the seams the engine and commands talk to.
//!
//! ```text
//! host/
//! ├── mod.rs      ◄─── HostError
//! ├── opener.rs   ◄─── Opener trait, OS file manager / browser launcher
//! ├── bridge.rs   ◄─── Script calls into a webview and their replies
//! ├── webview.rs  ◄─── PrintHost over Tauri webview windows
//! ├── spooler.rs  ◄─── CUPS command line (lp, lpstat)
//! └── js/         ◄─── Scripts evaluated inside print windows
//! ```

pub mod bridge;
pub mod opener;
pub mod spooler;
pub mod webview;

use thiserror::Error;

use crate::error::{ApiError, ErrorCode};

pub use bridge::{ScriptBridge, ScriptReply};
pub use opener::{Opener, SystemOpener};
pub use spooler::Spooler;
pub use webview::{SurfaceWindow, WebviewPrintHost, WebviewSurface};

/// Failure of an external host program or window.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed: {message}")]
    Failed { program: String, message: String },

    #[error("Spool file error: {0}")]
    Spool(#[from] std::io::Error),

    #[error("Window error: {0}")]
    Window(String),

    #[error("Script error: {0}")]
    Script(String),
}

impl From<tauri::Error> for HostError {
    fn from(err: tauri::Error) -> Self {
        HostError::Window(err.to_string())
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        ApiError::new(ErrorCode::HostError, err.to_string())
    }
}

/// Writes an executable shell script standing in for a host program.
#[cfg(all(test, unix))]
pub(crate) fn fake_program(dir: &std::path::Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}
