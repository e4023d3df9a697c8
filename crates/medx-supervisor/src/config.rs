//! # Shell Configuration
//!
//! Paths, ports, flags and timings used by the engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEDX_DISABLE_SERVICES=1, MEDX_ENABLE_LICENSE_SERVER=1              │
//! │     MEDX_PYTHON, MEDX_APP_DIR, MEDX_AUTO_MIGRATE                       │
//! │     MEDX_UPDATE_BACKUPS_KEEP, MEDX_RESOURCES_DIR, MEDX_USER_DATA_DIR   │
//! │     MEDX_ELECTRON_USERDATA_TEMP, ELECTRON_START_URL / MEDX_DEV_URL     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $MEDX_SHELL_CONFIG, or                                             │
//! │     ~/.config/medx/shell.toml (Linux)                                  │
//! │     %APPDATA%\MedX\MedX\config\shell.toml (Windows)                    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # shell.toml
//! [paths]
//! resources_dir = "C:/Program Files/MedX/resources"
//!
//! [services]
//! disabled = false
//! license_enabled = false
//! auto_migrate = true
//! restart_delay_ms = 800
//!
//! [updates]
//! backups_keep = 2
//!
//! [print]
//! drain_ms = 1200
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use medx_core::{ServiceRole, BACKEND_PORT, LICENSE_PORT};

use crate::error::{SupervisorError, SupervisorResult};

/// Env var naming an alternate shell config file.
pub const SHELL_CONFIG_ENV: &str = "MEDX_SHELL_CONFIG";

/// Folder under the user data dir holding everything the shell writes.
pub const MEDX_DIR_NAME: &str = "medx";

/// Folder name used under the temp dir by `MEDX_ELECTRON_USERDATA_TEMP`.
pub const TEMP_USER_DATA_DIR_NAME: &str = "medx-electron-userdata";

/// File stem of the bundled backend executable.
pub const BACKEND_EXE_STEM: &str = "medx-backend";

/// File stem of the bundled license server executable.
pub const LICENSE_EXE_STEM: &str = "medx-license";

// =============================================================================
// Paths
// =============================================================================

/// Filesystem roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Bundled resources root (backend, `.env.example`, update markers).
    /// Defaults to the directory of the running executable.
    #[serde(default)]
    pub resources_dir: Option<PathBuf>,

    /// Per-user data root. Defaults to the platform data dir.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,

    /// Working directory of the backend. Defaults to `<resources>/backend`.
    #[serde(default)]
    pub backend_dir: Option<PathBuf>,
}

/// Fully resolved paths.
///
/// ## Layout
/// ```text
/// <resources>/
///   .env.example
///   backend/medx-backend[.exe]
///   license_server/medx-license[.exe]
///   ._update_in_progress | ._update_done | ._update_failed
///   _update_tmp/  update.zip  _update_backup/<stamp>/
///
/// <userData>/medx/
///   .env
///   logs/backend.log
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellPaths {
    pub resources_dir: PathBuf,
    pub user_data_dir: PathBuf,
    pub backend_dir: PathBuf,
}

impl ShellPaths {
    /// Root of everything the shell writes.
    pub fn medx_dir(&self) -> PathBuf {
        self.user_data_dir.join(MEDX_DIR_NAME)
    }

    /// The backend env file.
    pub fn env_path(&self) -> PathBuf {
        self.medx_dir().join(".env")
    }

    /// Template copied on first run.
    pub fn env_example_path(&self) -> PathBuf {
        self.resources_dir.join(".env.example")
    }

    /// Folder holding child logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.medx_dir().join("logs")
    }

    /// Log file for one role.
    pub fn log_path(&self, role: ServiceRole) -> PathBuf {
        self.logs_dir().join(format!("{}.log", role))
    }

    /// Expected location of the backend executable.
    pub fn backend_exe(&self) -> PathBuf {
        self.backend_dir
            .join(format!("{}{}", BACKEND_EXE_STEM, std::env::consts::EXE_SUFFIX))
    }

    /// Working directory of the license server.
    pub fn license_dir(&self) -> PathBuf {
        self.resources_dir.join("license_server")
    }

    /// Expected location of the license server executable.
    pub fn license_exe(&self) -> PathBuf {
        self.license_dir()
            .join(format!("{}{}", LICENSE_EXE_STEM, std::env::consts::EXE_SUFFIX))
    }
}

// =============================================================================
// Services
// =============================================================================

/// Supervisor behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Never start children (UI development against an external backend).
    #[serde(default)]
    pub disabled: bool,

    /// Also supervise the license server.
    #[serde(default)]
    pub license_enabled: bool,

    /// Passed to the backend as `MEDX_AUTO_MIGRATE`.
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Interpreter used for the license server fallback.
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_backend_port")]
    pub backend_port: u16,

    #[serde(default = "default_license_port")]
    pub license_port: u16,

    /// Connect timeout of a port check.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Pause between a child exit and the second port check.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,

    /// Rolling restart window.
    #[serde(default = "default_restart_window")]
    pub restart_window_secs: u64,

    /// Automatic restarts allowed inside one window.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Delay between `save_config` and the service start it triggers.
    #[serde(default = "default_start_after_save")]
    pub start_after_save_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_python() -> String {
    "python".to_string()
}
fn default_backend_port() -> u16 {
    BACKEND_PORT
}
fn default_license_port() -> u16 {
    LICENSE_PORT
}
fn default_connect_timeout() -> u64 {
    400
}
fn default_restart_delay() -> u64 {
    800
}
fn default_restart_window() -> u64 {
    60
}
fn default_max_restarts() -> usize {
    5
}
fn default_start_after_save() -> u64 {
    300
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            disabled: false,
            license_enabled: false,
            auto_migrate: true,
            python: default_python(),
            backend_port: default_backend_port(),
            license_port: default_license_port(),
            connect_timeout_ms: default_connect_timeout(),
            restart_delay_ms: default_restart_delay(),
            restart_window_secs: default_restart_window(),
            max_restarts: default_max_restarts(),
            start_after_save_ms: default_start_after_save(),
        }
    }
}

impl ServiceSettings {
    /// Port a role listens on.
    pub fn port(&self, role: ServiceRole) -> u16 {
        match role {
            ServiceRole::Backend => self.backend_port,
            ServiceRole::License => self.license_port,
        }
    }

    /// Whether a role is supervised at all.
    pub fn is_enabled(&self, role: ServiceRole) -> bool {
        match role {
            ServiceRole::Backend => true,
            ServiceRole::License => self.license_enabled,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Update-marker watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Backup folders kept after a finished update.
    #[serde(default = "default_backups_keep")]
    pub backups_keep: usize,

    /// Attempts per deletion before giving up.
    #[serde(default = "default_delete_attempts")]
    pub delete_attempts: u32,

    /// First delay between deletion attempts.
    #[serde(default = "default_delete_initial_backoff")]
    pub delete_initial_backoff_ms: u64,

    /// Longest delay between deletion attempts.
    #[serde(default = "default_delete_max_backoff")]
    pub delete_max_backoff_ms: u64,
}

fn default_poll_interval() -> u64 {
    900
}
fn default_backups_keep() -> usize {
    2
}
fn default_delete_attempts() -> u32 {
    40
}
fn default_delete_initial_backoff() -> u64 {
    50
}
fn default_delete_max_backoff() -> u64 {
    1_000
}

impl Default for UpdateSettings {
    fn default() -> Self {
        UpdateSettings {
            poll_interval_ms: default_poll_interval(),
            backups_keep: default_backups_keep(),
            delete_attempts: default_delete_attempts(),
            delete_initial_backoff_ms: default_delete_initial_backoff(),
            delete_max_backoff_ms: default_delete_max_backoff(),
        }
    }
}

impl UpdateSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// Printing
// =============================================================================

/// Print pipeline timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintTimings {
    /// Upper bound on waiting for fonts and images.
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_ms: u64,

    /// Pause after the forced repaint.
    #[serde(default = "default_repaint")]
    pub repaint_ms: u64,

    /// Upper bound on waiting for the host completion signal.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_ms: u64,

    /// Spooler drain before the surface is closed.
    #[serde(default = "default_drain")]
    pub drain_ms: u64,
}

fn default_settle_timeout() -> u64 {
    5_000
}
fn default_repaint() -> u64 {
    80
}
fn default_completion_timeout() -> u64 {
    60_000
}
fn default_drain() -> u64 {
    1_200
}

impl Default for PrintTimings {
    fn default() -> Self {
        PrintTimings {
            settle_timeout_ms: default_settle_timeout(),
            repaint_ms: default_repaint(),
            completion_timeout_ms: default_completion_timeout(),
            drain_ms: default_drain(),
        }
    }
}

// =============================================================================
// UI
// =============================================================================

/// Where the UI is served from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiSettings {
    /// Dev server URL; when unset the bundled frontend is used.
    #[serde(default)]
    pub start_url: Option<String>,
}

// =============================================================================
// Main Shell Configuration
// =============================================================================

/// Complete shell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub services: ServiceSettings,

    #[serde(default)]
    pub updates: UpdateSettings,

    #[serde(default)]
    pub print: PrintTimings,

    #[serde(default)]
    pub ui: UiSettings,
}

impl ShellConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (shell.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SupervisorResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading shell config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load shell config: {}. Using defaults.", e);
            let mut config = Self::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SupervisorResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SupervisorError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Shell config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SupervisorResult<()> {
        let s = &self.services;
        if s.backend_port == 0 || s.license_port == 0 {
            return Err(SupervisorError::InvalidConfig(
                "service ports must be non-zero".into(),
            ));
        }
        if s.backend_port == s.license_port {
            return Err(SupervisorError::InvalidConfig(format!(
                "backend and license server cannot share port {}",
                s.backend_port
            )));
        }
        if s.max_restarts == 0 {
            return Err(SupervisorError::InvalidConfig(
                "max_restarts must be greater than 0".into(),
            ));
        }
        if s.python.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig("python must not be empty".into()));
        }
        if self.updates.poll_interval_ms == 0 {
            return Err(SupervisorError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.updates.delete_attempts == 0 {
            return Err(SupervisorError::InvalidConfig(
                "delete_attempts must be greater than 0".into(),
            ));
        }
        if let Some(url) = &self.ui.start_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SupervisorError::InvalidConfig(format!(
                    "start_url must be an http(s) URL, got: {}",
                    url
                )));
            }
        }
        Ok(())
    }

    /// Applies overrides from the process environment.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v.trim() == "1");

        if let Some(disabled) = flag("MEDX_DISABLE_SERVICES") {
            if disabled {
                debug!("Services disabled from environment");
            }
            self.services.disabled = disabled;
        }

        if let Some(enabled) = flag("MEDX_ENABLE_LICENSE_SERVER") {
            self.services.license_enabled = enabled;
        }

        if let Some(python) = lookup("MEDX_PYTHON").filter(|p| !p.trim().is_empty()) {
            self.services.python = python;
        }

        if let Some(migrate) = lookup("MEDX_AUTO_MIGRATE") {
            self.services.auto_migrate = migrate.trim() != "0";
        }

        if let Some(keep) = lookup("MEDX_UPDATE_BACKUPS_KEEP") {
            match keep.trim().parse::<usize>() {
                Ok(n) => self.updates.backups_keep = n,
                Err(_) => warn!(value = %keep, "Ignoring invalid MEDX_UPDATE_BACKUPS_KEEP"),
            }
        }

        if let Some(dir) = lookup("MEDX_RESOURCES_DIR").filter(|d| !d.is_empty()) {
            self.paths.resources_dir = Some(PathBuf::from(dir));
        }

        if let Some(dir) = lookup("MEDX_USER_DATA_DIR").filter(|d| !d.is_empty()) {
            self.paths.user_data_dir = Some(PathBuf::from(dir));
        } else if flag("MEDX_ELECTRON_USERDATA_TEMP") == Some(true) {
            self.paths.user_data_dir = Some(std::env::temp_dir().join(TEMP_USER_DATA_DIR_NAME));
        }

        if let Some(dir) = lookup("MEDX_APP_DIR").filter(|d| !d.is_empty()) {
            self.paths.backend_dir = Some(PathBuf::from(dir));
        }

        let start_url = lookup("ELECTRON_START_URL")
            .filter(|u| !u.is_empty())
            .or_else(|| lookup("MEDX_DEV_URL").filter(|u| !u.is_empty()));
        if let Some(url) = start_url {
            debug!(url = %url, "Overriding start URL from environment");
            self.ui.start_url = Some(url);
        }
    }

    /// Returns the config file path: `$MEDX_SHELL_CONFIG` or the platform
    /// config dir.
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(SHELL_CONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        directories::ProjectDirs::from("uz", "medx", "MedX")
            .map(|dirs| dirs.config_dir().join("shell.toml"))
    }

    /// Resolves every path root.
    pub fn resolve_paths(&self) -> ShellPaths {
        let resources_dir = self
            .paths
            .resources_dir
            .clone()
            .unwrap_or_else(default_resources_dir);
        let user_data_dir = self
            .paths
            .user_data_dir
            .clone()
            .unwrap_or_else(default_user_data_dir);
        let backend_dir = self
            .paths
            .backend_dir
            .clone()
            .unwrap_or_else(|| resources_dir.join("backend"));

        ShellPaths {
            resources_dir,
            user_data_dir,
            backend_dir,
        }
    }
}

fn default_resources_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_user_data_dir() -> PathBuf {
    directories::ProjectDirs::from("uz", "medx", "MedX")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(TEMP_USER_DATA_DIR_NAME))
}
