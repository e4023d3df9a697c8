//! # Windows
//!
//! The main window, the setup wizard, and shell events delivered to them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "main"    index.html or the dev server, hidden until showMainWindow    │
//! │  "setup"   setup.html, opened on setupRequired; when it is destroyed    │
//! │            the shell re-checks the env file (setup_closed)              │
//! │  "print-*" opened per job by the webview print host                     │
//! │                                                                         │
//! │  Every ShellEvent is also emitted to the UI as "medx://shell".          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tauri::{
    AppHandle, Emitter, Manager, Runtime, WebviewUrl, WebviewWindow, WebviewWindowBuilder,
    WindowEvent,
};
use tracing::{debug, info, warn};

use medx_supervisor::{ShellEvent, ShellEvents};

use crate::state::{ServiceState, ShellState};

pub const MAIN_WINDOW: &str = "main";
pub const SETUP_WINDOW: &str = "setup";

/// Event name the UI listens on.
pub const SHELL_EVENT: &str = "medx://shell";

/// Defines `window.medx` in every shell window.
const MEDX_API_JS: &str = include_str!("js/medx.js");

/// Main window content: the dev server when configured, else the bundle.
pub fn main_window_url(start_url: Option<&str>) -> WebviewUrl {
    match start_url.map(url::Url::parse) {
        Some(Ok(url)) => WebviewUrl::External(url),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid start URL, using the bundled UI");
            WebviewUrl::App("index.html".into())
        }
        None => WebviewUrl::App("index.html".into()),
    }
}

/// Creates the hidden main window.
pub fn create_main_window<R: Runtime>(
    app: &AppHandle<R>,
    start_url: Option<&str>,
) -> tauri::Result<WebviewWindow<R>> {
    WebviewWindowBuilder::new(app, MAIN_WINDOW, main_window_url(start_url))
        .title("MedX")
        .inner_size(1280.0, 800.0)
        .min_inner_size(1024.0, 640.0)
        .visible(false)
        .center()
        .initialization_script(MEDX_API_JS)
        .build()
}

/// Opens the setup wizard, or focuses it when already open.
pub fn open_setup_window<R: Runtime>(app: &AppHandle<R>) -> tauri::Result<()> {
    if let Some(window) = app.get_webview_window(SETUP_WINDOW) {
        window.show()?;
        window.set_focus()?;
        return Ok(());
    }

    let window =
        WebviewWindowBuilder::new(app, SETUP_WINDOW, WebviewUrl::App("setup.html".into()))
            .title("MedX Setup")
            .inner_size(560.0, 680.0)
            .resizable(false)
            .center()
            .focused(true)
            .initialization_script(MEDX_API_JS)
            .build()?;

    let handle = app.clone();
    window.on_window_event(move |event| {
        if let WindowEvent::Destroyed = event {
            let handle = handle.clone();
            tauri::async_runtime::spawn(async move { setup_window_closed(handle).await });
        }
    });
    info!("Setup wizard opened");
    Ok(())
}

async fn setup_window_closed<R: Runtime>(app: AppHandle<R>) {
    let services = app.state::<ServiceState>();
    let shell = app.state::<ShellState>();
    match services.setup_closed(&shell).await {
        Ok(closed) => debug!(?closed, "Setup wizard closed"),
        Err(e) => warn!(error = %e, "Handling the closed wizard failed"),
    }
}

/// Delivers shell events to the windows and the UI.
pub struct TauriEvents<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriEvents<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        TauriEvents { app }
    }

    fn apply(&self, event: &ShellEvent) -> tauri::Result<()> {
        match event {
            ShellEvent::ShowMainWindow => {
                if let Some(window) = self.app.get_webview_window(MAIN_WINDOW) {
                    window.show()?;
                    window.set_focus()?;
                }
            }
            ShellEvent::ReloadMainWindow => {
                if let Some(window) = self.app.get_webview_window(MAIN_WINDOW) {
                    window.eval("window.location.reload()")?;
                }
            }
            ShellEvent::SetupRequired { .. } => open_setup_window(&self.app)?,
            _ => {}
        }
        Ok(())
    }
}

impl<R: Runtime> ShellEvents for TauriEvents<R> {
    fn emit(&self, event: ShellEvent) {
        debug!(?event, "Emitting shell event");
        if let Err(e) = self.apply(&event) {
            warn!(error = %e, ?event, "Window update failed");
        }
        if let Err(e) = self.app.emit(SHELL_EVENT, &event) {
            warn!(error = %e, "Failed to emit shell event");
        }
    }
}
