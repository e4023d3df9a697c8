//! # Service State
//!
//! Wraps the supervisor handle and the resolved shell layout, plus the
//! setup wizard operations over the backend env file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use medx_core::env::ConnectionConfig;
use medx_core::validation::SetupForm;
use medx_supervisor::{env_store, ShellConfig, ShellPaths, StartOutcome, SupervisorHandle};

use crate::error::ApiError;
use crate::state::ShellState;

/// Response DTO of `setup_closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupClosedDto {
    /// The env file is valid now.
    pub configured: bool,
    pub outcome: Option<StartOutcome>,
}

/// Service state shared by commands.
pub struct ServiceState {
    supervisor: SupervisorHandle,
    config: Arc<ShellConfig>,
    paths: ShellPaths,
}

impl ServiceState {
    pub fn new(supervisor: SupervisorHandle, config: Arc<ShellConfig>) -> Self {
        let paths = config.resolve_paths();
        ServiceState {
            supervisor,
            config,
            paths,
        }
    }

    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn paths(&self) -> &ShellPaths {
        &self.paths
    }

    /// Env file path; created with placeholders on first use so the
    /// wizard always has a path to show.
    pub fn env_path(&self) -> PathBuf {
        env_store::ensure_env_file(&self.paths)
    }

    /// The parsed connection settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        env_store::load_connection_config(&self.env_path())
    }

    /// Folder holding the env file.
    pub fn env_folder(&self) -> PathBuf {
        self.env_path()
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.paths.medx_dir())
    }

    /// Log folder, created if missing.
    pub fn log_folder(&self) -> Result<PathBuf, ApiError> {
        let logs = self.paths.logs_dir();
        std::fs::create_dir_all(&logs)
            .map_err(|e| ApiError::internal(format!("Cannot create {}: {}", logs.display(), e)))?;
        Ok(logs)
    }

    /// Validates and writes the wizard form, then starts services shortly
    /// after.
    pub fn save_connection(&self, form: &SetupForm) -> Result<ConnectionConfig, ApiError> {
        let path = self.env_path();
        let saved = env_store::save_connection(&path, form)?;
        info!(?path, "Setup saved, services will start");
        self.start_services_later();
        Ok(saved)
    }

    /// Starts services in the background after the post-save delay.
    pub fn start_services_later(&self) {
        let supervisor = self.supervisor.clone();
        let delay = Duration::from_millis(self.config.services.start_after_save_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = supervisor.start_services().await {
                warn!(error = %e, "Starting services after save failed");
            }
        });
    }

    /// The wizard closed. With a valid env file, start services and make
    /// sure the main window is visible.
    pub async fn setup_closed(&self, shell: &ShellState) -> Result<SetupClosedDto, ApiError> {
        if !env_store::is_env_configured(&self.env_path()) {
            debug!("Setup closed without a valid config");
            return Ok(SetupClosedDto {
                configured: false,
                outcome: None,
            });
        }

        info!("Setup closed with a valid config");
        let outcome = self.supervisor.start_services().await?;
        shell.show_main_window();
        Ok(SetupClosedDto {
            configured: true,
            outcome: Some(outcome),
        })
    }
}
