//! # Shell State
//!
//! Window bookkeeping and OS integration.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use medx_supervisor::{ShellEvent, ShellEvents};

use crate::error::ApiError;
use crate::host::Opener;

pub struct ShellState {
    opener: Arc<dyn Opener>,
    events: Arc<dyn ShellEvents>,
    main_window_shown: AtomicBool,
    start_url: Option<String>,
}

impl ShellState {
    pub fn new(
        opener: Arc<dyn Opener>,
        events: Arc<dyn ShellEvents>,
        start_url: Option<String>,
    ) -> Self {
        ShellState {
            opener,
            events,
            main_window_shown: AtomicBool::new(false),
            start_url,
        }
    }

    /// Opens a folder in the OS file manager.
    pub fn open_folder(&self, folder: &Path) -> Result<(), ApiError> {
        debug!(?folder, "Opening folder");
        self.opener.open(folder)?;
        Ok(())
    }

    /// Dev server URL, or `None` for the bundled UI.
    pub fn start_url(&self) -> Option<&str> {
        self.start_url.as_deref()
    }

    /// Shows the main window. Only the first call emits.
    pub fn show_main_window(&self) -> bool {
        if self.main_window_shown.swap(true, Ordering::SeqCst) {
            debug!("Main window already shown");
            return false;
        }
        self.events.emit(ShellEvent::ShowMainWindow);
        true
    }
}
