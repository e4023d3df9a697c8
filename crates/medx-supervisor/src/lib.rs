//! # medx-supervisor: Service Supervisor & Print Engine for the MedX Shell
//!
//! This crate owns every side effect of the desktop shell: the backend and
//! license server processes, the env file, update markers, and print jobs.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shell Engine Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  Supervisor (actor task)                         │  │
//! │  │                                                                  │  │
//! │  │  Spawned once at boot, driven through SupervisorHandle          │  │
//! │  │  Owns every managed child and its restart budget                 │  │
//! │  └──────────┬──────────────────────┬────────────────────┬───────────┘  │
//! │             ▼                      ▼                    ▼               │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────────────┐  │
//! │  │   Launcher     │   │  Port Check    │   │   UpdateWatcher        │  │
//! │  │                │   │                │   │                        │  │
//! │  │ Launch plans,  │   │ TCP connect    │   │ Polls ._update_*       │  │
//! │  │ env injection, │   │ 127.0.0.1,     │   │ markers, restarts      │  │
//! │  │ log capture    │   │ 400 ms         │   │ services, cleans up    │  │
//! │  └────────────────┘   └────────────────┘   └────────────────────────┘  │
//! │                                                                         │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────────────┐  │
//! │  │   EnvStore     │   │  ShellConfig   │   │   PrintPipeline        │  │
//! │  │                │   │                │   │                        │  │
//! │  │ medx/.env,     │   │ TOML + env     │   │ PrintHost surfaces,    │  │
//! │  │ DATABASE_URL,  │   │ overrides,     │   │ image mode, page size, │  │
//! │  │ SECRET_KEY     │   │ path layout    │   │ completion timeout     │  │
//! │  └────────────────┘   └────────────────┘   └────────────────────────┘  │
//! │                                                                         │
//! │  EVENTS (to the UI via ShellEvents):                                   │
//! │  • setupRequired   • fatalError      • crashLoop                       │
//! │  • serviceStatus   • updateFinished  • reloadMainWindow                │
//! │  • showMainWindow                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Shell configuration (TOML, env overrides, path layout)
//! - [`env_store`] - Reading and writing the backend env file
//! - [`error`] - Supervisor error types
//! - [`events`] - Events raised for the UI layer
//! - [`launcher`] - Launch plans and the process launcher
//! - [`print`] - Print pipeline over a host rendering surface
//! - [`ports`] - Local port checks
//! - [`supervisor`] - The supervisor actor and its handle
//! - [`updates`] - Update marker watcher and artifact cleanup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medx_supervisor::{NoOpEvents, ProcessLauncher, ShellConfig, Supervisor};
//!
//! let config = ShellConfig::load_or_default(None);
//! let handle = Supervisor::spawn(config, Arc::new(ProcessLauncher), Arc::new(NoOpEvents));
//!
//! handle.start_services().await?;
//! for status in handle.status().await? {
//!     println!("{}: {:?}", status.role, status.state);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod env_store;
pub mod error;
pub mod events;
pub mod launcher;
pub mod print;
pub mod ports;
pub mod supervisor;
pub mod updates;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ShellConfig, ShellPaths};
pub use error::{SupervisorError, SupervisorResult};
pub use events::{NoOpEvents, ShellEvent, ShellEvents};
pub use launcher::{LaunchSpec, Launcher, ManagedChild, ProcessLauncher};
pub use print::{HostPrinter, PrintHost, PrintOptions, PrintPipeline, PrintSurface};
pub use supervisor::{StartOutcome, Supervisor, SupervisorHandle};
pub use updates::{UpdateMarkers, UpdateWatcher};
