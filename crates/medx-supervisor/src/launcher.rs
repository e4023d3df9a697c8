//! # Process Launcher
//!
//! Turns a role into a launch plan and starts it.
//!
//! ## Launch Plans
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  backend  (essential)                                                   │
//! │    program  <backend_dir>/medx-backend[.exe]   (missing ──► fatal)      │
//! │    cwd      <backend_dir>                                               │
//! │    env      MEDX_ENV_FILE, MEDX_APP_DIR, MEDX_AUTO_MIGRATE              │
//! │    output   <userData>/medx/logs/backend.log   (unopenable ──► inherit) │
//! │                                                                         │
//! │  license  (optional, MEDX_ENABLE_LICENSE_SERVER=1)                      │
//! │    program  <resources>/license_server/medx-license[.exe]               │
//! │             missing ──► python -m uvicorn license_server.main:app       │
//! │                                --port 8001                              │
//! │    cwd      <resources>                                                 │
//! │    env      MEDX_ENV_FILE                                               │
//! │    output   inherited                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`Launcher`] trait is the seam the supervisor is tested through.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use medx_core::ServiceRole;

use crate::config::{ServiceSettings, ShellPaths};
use crate::error::{SupervisorError, SupervisorResult};

/// Everything needed to (re)start one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub role: ServiceRole,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Append stdout/stderr here; `None` inherits the shell's stdio.
    pub log_path: Option<PathBuf>,
}

impl LaunchSpec {
    /// Builds the plan for `role`.
    ///
    /// Fails with [`SupervisorError::BackendMissing`] when the backend
    /// executable is absent; the backend has no interpreter fallback.
    pub fn for_role(
        role: ServiceRole,
        paths: &ShellPaths,
        settings: &ServiceSettings,
    ) -> SupervisorResult<Self> {
        let env_file = ("MEDX_ENV_FILE".to_string(), paths.env_path().display().to_string());

        match role {
            ServiceRole::Backend => {
                let program = paths.backend_exe();
                if !program.is_file() {
                    return Err(SupervisorError::BackendMissing { path: program });
                }
                let cwd = paths.backend_dir.clone();
                let auto_migrate = if settings.auto_migrate { "1" } else { "0" };
                Ok(LaunchSpec {
                    role,
                    program,
                    args: Vec::new(),
                    env: vec![
                        env_file,
                        ("MEDX_APP_DIR".to_string(), cwd.display().to_string()),
                        ("MEDX_AUTO_MIGRATE".to_string(), auto_migrate.to_string()),
                    ],
                    cwd,
                    log_path: Some(paths.log_path(role)),
                })
            }
            ServiceRole::License => {
                let exe = paths.license_exe();
                let port = settings.port(role).to_string();
                let (program, args) = if exe.is_file() {
                    (exe, vec!["--port".to_string(), port])
                } else {
                    debug!(?exe, python = %settings.python, "License executable missing, using interpreter");
                    (
                        PathBuf::from(&settings.python),
                        ["-m", "uvicorn", "license_server.main:app", "--port"]
                            .iter()
                            .map(|s| s.to_string())
                            .chain(std::iter::once(port))
                            .collect(),
                    )
                };
                Ok(LaunchSpec {
                    role,
                    program,
                    args,
                    cwd: paths.resources_dir.clone(),
                    env: vec![env_file],
                    log_path: None,
                })
            }
        }
    }
}

// =============================================================================
// Launcher Trait
// =============================================================================

/// A started child the supervisor can wait on and kill.
#[async_trait]
pub trait ManagedChild: Send {
    /// OS process id, if known.
    fn id(&self) -> Option<u32>;

    /// Resolves when the child exits, with its exit code if it had one.
    async fn wait(&mut self) -> SupervisorResult<Option<i32>>;

    /// Kills the child.
    async fn kill(&mut self) -> SupervisorResult<()>;
}

/// Starts children from launch plans.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ManagedChild>>;
}

// =============================================================================
// OS Launcher
// =============================================================================

/// Launcher backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

struct ProcessChild {
    child: Child,
}

#[async_trait]
impl ManagedChild for ProcessChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> SupervisorResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| SupervisorError::ChildFailed(e.to_string()))?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> SupervisorResult<()> {
        self.child
            .kill()
            .await
            .map_err(|e| SupervisorError::ChildFailed(e.to_string()))
    }
}

/// Opens the log file for appending; `None` means inherit stdio.
fn open_log(path: &Path) -> Option<(Stdio, Stdio)> {
    let open = || -> std::io::Result<(Stdio, Stdio)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let out = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let err = out.try_clone()?;
        Ok((Stdio::from(out), Stdio::from(err)))
    };

    match open() {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!(?path, error = %e, "Cannot open service log, inheriting stdio");
            None
        }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ManagedChild>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());

        match spec.log_path.as_deref().and_then(open_log) {
            Some((out, err)) => {
                command.stdout(out).stderr(err);
            }
            None => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        let child = command.spawn().map_err(|e| SupervisorError::SpawnFailed {
            role: spec.role,
            message: format!("{}: {}", spec.program.display(), e),
        })?;

        info!(role = %spec.role, pid = ?child.id(), program = ?spec.program, "Service process started");
        Ok(Box::new(ProcessChild { child }))
    }
}
