//! # Service Commands
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Service Commands                                 │
//! │                                                                         │
//! │  start_services()   - Start every enabled service (shared in flight)    │
//! │  service_status()   - Per-role state, restarts, log path                │
//! │  setup_closed()     - Wizard closed: start + show window if valid       │
//! │  open_log_folder()  - Open <userData>/medx/logs                         │
//! │  start_url()        - Dev server URL or null                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tauri::State;

use medx_core::ServiceStatus;
use medx_supervisor::StartOutcome;

use crate::error::ApiError;
use crate::state::{ServiceState, SetupClosedDto, ShellState};

#[tauri::command]
pub async fn start_services(services: State<'_, ServiceState>) -> Result<StartOutcome, ApiError> {
    Ok(services.supervisor().start_services().await?)
}

#[tauri::command]
pub async fn service_status(
    services: State<'_, ServiceState>,
) -> Result<Vec<ServiceStatus>, ApiError> {
    Ok(services.supervisor().status().await?)
}

/// The setup wizard closed. Also raised when its window is destroyed.
#[tauri::command]
pub async fn setup_closed(
    services: State<'_, ServiceState>,
    shell: State<'_, ShellState>,
) -> Result<SetupClosedDto, ApiError> {
    services.setup_closed(&shell).await
}

#[tauri::command]
pub async fn open_log_folder(
    services: State<'_, ServiceState>,
    shell: State<'_, ShellState>,
) -> Result<(), ApiError> {
    shell.open_folder(&services.log_folder()?)
}

#[tauri::command]
pub async fn start_url(shell: State<'_, ShellState>) -> Result<Option<String>, ApiError> {
    Ok(shell.start_url().map(str::to_string))
}
