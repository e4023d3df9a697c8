//! # Config Commands
//!
//! Setup wizard commands over the backend env file.

use tauri::State;

use medx_core::env::ConnectionConfig;
use medx_core::validation::SetupForm;
use medx_supervisor::env_store;

use crate::error::ApiError;
use crate::state::{ServiceState, ShellState};

/// Gets the parsed connection settings.
///
/// Creates the env file with placeholders on first use so the wizard
/// always has a path to show.
#[tauri::command]
pub async fn get_config(services: State<'_, ServiceState>) -> Result<ConnectionConfig, ApiError> {
    Ok(services.connection_config())
}

/// Generates a fresh 64-hex secret.
#[tauri::command]
pub async fn generate_secret() -> Result<String, ApiError> {
    Ok(env_store::generate_secret())
}

/// Shows the env file's folder in the OS file manager.
#[tauri::command]
pub async fn open_env_folder(
    services: State<'_, ServiceState>,
    shell: State<'_, ShellState>,
) -> Result<(), ApiError> {
    shell.open_folder(&services.env_folder())
}

/// Validates and writes the form, then starts services shortly after.
///
/// # Arguments
/// * `form` - Host, port, database, user, password and secret key
#[tauri::command]
pub async fn save_config(
    services: State<'_, ServiceState>,
    form: SetupForm,
) -> Result<ConnectionConfig, ApiError> {
    services.save_connection(&form)
}
