//! # MedX Desktop Library
//!
//! Core library for the MedX desktop shell.
//! This is the main entry point that configures and runs the Tauri app.
//!
//! ## Module Organization
//! ```text
//! medx_desktop_lib/
//! ├── lib.rs          ◄─── You are here (Tauri setup & run)
//! ├── windows.rs      ◄─── Main and setup windows, shell events
//! ├── state/
//! │   ├── mod.rs      ◄─── State type exports
//! │   ├── services.rs ◄─── Supervisor handle, paths, env file
//! │   ├── print.rs    ◄─── Print pipeline and settings cache
//! │   └── shell.rs    ◄─── Opener, window flag, start URL
//! ├── commands/
//! │   ├── mod.rs      ◄─── Command exports
//! │   ├── config.rs   ◄─── Setup wizard commands
//! │   ├── services.rs ◄─── Service and shell commands
//! │   └── print.rs    ◄─── Printing commands
//! ├── host/
//! │   ├── opener.rs   ◄─── xdg-open / open / explorer
//! │   ├── bridge.rs   ◄─── Scripts evaluated in print windows
//! │   ├── webview.rs  ◄─── Print host over webview windows
//! │   └── spooler.rs  ◄─── lp / lpstat
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## State Management (Multiple State Types)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────┐   │
//! │  │  ServiceState    │ │   PrintState     │ │    ShellState        │   │
//! │  │                  │ │                  │ │                      │   │
//! │  │  • Supervisor    │ │  • Pipeline      │ │  • Opener            │   │
//! │  │  • Paths         │ │  • Script bridge │ │  • Events            │   │
//! │  │  • Env file      │ │  • Settings      │ │  • Start URL         │   │
//! │  └──────────────────┘ └──────────────────┘ └──────────────────────┘   │
//! │                                                                         │
//! │  Each command only requests the state it needs.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod host;
pub mod state;
pub mod windows;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tauri::{Manager, RunEvent};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use medx_supervisor::{
    PrintPipeline, ProcessLauncher, ShellConfig, ShellEvents, StartOutcome, Supervisor,
    UpdateMarkers,
};

use host::{Opener, ScriptBridge, Spooler, SystemOpener, WebviewPrintHost};
use state::{PrintState, ServiceState, ShellState};
use windows::TauriEvents;

/// Runs the Tauri application.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       Shell Startup                                     │
/// │                                                                         │
/// │  1. Initialize Logging ───────────────────────────────────────────────► │
/// │     • tracing-subscriber with env filter                                │
/// │     • Default: info,medx=debug, can be overridden with RUST_LOG         │
/// │                                                                         │
/// │  2. Load Shell Config ────────────────────────────────────────────────► │
/// │     • defaults ─► shell.toml ─► MEDX_* environment                      │
/// │                                                                         │
/// │  3. Setup Hook ───────────────────────────────────────────────────────► │
/// │     • Supervisor task, print pipeline over webview windows + lp         │
/// │     • Manage ServiceState, PrintState, ShellState                       │
/// │     • Create the hidden main window                                     │
/// │                                                                         │
/// │  4. Boot ─────────────────────────────────────────────────────────────► │
/// │     • update markers present ─► watch them, services start after        │
/// │     • otherwise start services ─► show main window (or setup wizard)    │
/// │                                                                         │
/// │  5. Run until the last window closes, then stop services               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn run() {
    init_tracing();

    info!("Starting MedX desktop shell");

    let config = Arc::new(ShellConfig::load_or_default(None));

    let app = tauri::Builder::default()
        .setup(move |app| {
            let handle = app.handle().clone();
            let events: Arc<dyn ShellEvents> = Arc::new(TauriEvents::new(handle.clone()));
            let opener: Arc<dyn Opener> = Arc::new(SystemOpener);
            let bridge = Arc::new(ScriptBridge::new());

            // The supervisor task runs on Tauri's async runtime
            let supervisor = tauri::async_runtime::block_on(async {
                Supervisor::spawn((*config).clone(), Arc::new(ProcessLauncher), events.clone())
            });
            let pipeline = PrintPipeline::new(
                Arc::new(WebviewPrintHost::new(
                    handle.clone(),
                    bridge.clone(),
                    Spooler::default(),
                )),
                config.print.clone(),
            );

            app.manage(ServiceState::new(supervisor, config.clone()));
            app.manage(PrintState::new(pipeline, bridge));
            app.manage(ShellState::new(opener, events, config.ui.start_url.clone()));
            info!("State initialized");

            windows::create_main_window(&handle, config.ui.start_url.as_deref())?;

            tauri::async_runtime::spawn(async move {
                let services = handle.state::<ServiceState>();
                let shell = handle.state::<ShellState>();
                boot(&services, &shell).await;
            });
            Ok(())
        })
        // Register all commands
        .invoke_handler(tauri::generate_handler![
            // Setup wizard
            commands::config::get_config,
            commands::config::generate_secret,
            commands::config::open_env_folder,
            commands::config::save_config,
            // Services and shell
            commands::services::setup_closed,
            commands::services::start_services,
            commands::services::service_status,
            commands::services::open_log_folder,
            commands::services::start_url,
            // Printing
            commands::print::print_html,
            commands::print::list_printers,
            commands::print::get_print_settings,
            commands::print::set_print_settings,
            commands::print::print_receipt,
            commands::print::print_queue_ticket,
            commands::print::print_surface_reply,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to build the Tauri application");
            std::process::exit(1);
        }
    };

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            info!("Shutting down");
            let Some(services) = handle.try_state::<ServiceState>() else {
                return;
            };
            let stopped = tauri::async_runtime::block_on(services.supervisor().stop_services());
            if let Err(e) = stopped {
                warn!(error = %e, "Stopping services failed");
            }
        }
    });
}

/// Starts services (or the update watcher) and shows the main window.
pub async fn boot(services: &ServiceState, shell: &ShellState) {
    let supervisor = services.supervisor();
    let resources = &services.paths().resources_dir;

    if UpdateMarkers::scan(resources).await.any() {
        info!(?resources, "Update markers present, waiting for the updater");
        if let Err(e) = supervisor.watch_updates().await {
            warn!(error = %e, "Could not start the update watcher");
        }
        shell.show_main_window();
        return;
    }

    match supervisor.start_services().await {
        Ok(StartOutcome::SetupRequired) => info!("Waiting for setup"),
        Ok(outcome) => {
            info!(?outcome, "Services started");
            shell.show_main_window();
        }
        Err(e) => {
            warn!(error = %e, "Starting services failed");
            shell.show_main_window();
        }
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=medx_supervisor=trace` - Show trace for the engine only
/// - Default: info, debug for medx crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,medx=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, VALID_ENV};
    use medx_supervisor::ShellEvent;

    #[tokio::test]
    async fn test_boot_with_markers_watches_updates() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        std::fs::write(
            dir.path().join("resources").join("._update_in_progress"),
            b"",
        )
        .unwrap();

        boot(&h.services, &h.shell).await;

        assert_eq!(h.events.take(), vec![ShellEvent::ShowMainWindow]);
    }

    #[tokio::test]
    async fn test_boot_shows_main_window() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path());
        h.write_env(VALID_ENV);

        boot(&h.services, &h.shell).await;

        let events = h.events.take();
        assert!(events.contains(&ShellEvent::ShowMainWindow), "{:?}", events);
    }
}
