//! Opens folders and documents with the platform's default handler.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::HostError;

/// Opens a path in the OS file manager or default application.
pub trait Opener: Send + Sync {
    fn open(&self, target: &Path) -> Result<(), HostError>;
}

/// Opener backed by `xdg-open`, `open` or `explorer`.
#[derive(Debug, Default, Clone)]
pub struct SystemOpener;

#[cfg(target_os = "windows")]
const OPEN_PROGRAM: &str = "explorer";

#[cfg(target_os = "macos")]
const OPEN_PROGRAM: &str = "open";

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const OPEN_PROGRAM: &str = "xdg-open";

impl Opener for SystemOpener {
    fn open(&self, target: &Path) -> Result<(), HostError> {
        debug!(?target, program = OPEN_PROGRAM, "Opening with default handler");
        // Not waited on; the handler may outlive the request.
        Command::new(OPEN_PROGRAM)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|source| HostError::Spawn {
                program: OPEN_PROGRAM.to_string(),
                source,
            })
    }
}
