//! # State Module
//!
//! Manages shell state for Tauri commands.
//!
//! ## Multiple State Types
//! Each command receives only the state it needs via `State<'_, T>`.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Tauri App                                  │   │
//! │  │                   app.manage(state)                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                              │                                          │
//! │          ┌──────────────────┼──────────────────┐                       │
//! │          ▼                  ▼                  ▼                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐              │
//! │  │ ServiceState │  │  PrintState  │  │   ShellState     │              │
//! │  │              │  │              │  │                  │              │
//! │  │  Supervisor  │  │  Pipeline    │  │  Opener          │              │
//! │  │  handle      │  │  Script      │  │  events          │              │
//! │  │  paths       │  │   bridge     │  │  window shown    │              │
//! │  │  env file    │  │  RwLock<     │  │  start URL       │              │
//! │  │              │  │   Print      │  │                  │              │
//! │  │              │  │   Settings>  │  │                  │              │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘              │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • ServiceState: SupervisorHandle is a cloneable channel handle        │
//! │  • PrintState: settings cache behind RwLock, one window per job        │
//! │  • ShellState: atomic flag, immutable otherwise                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod print;
mod services;
mod shell;

pub use print::{request_for, PrintState, TemplatedPrint};
pub use services::{ServiceState, SetupClosedDto};
pub use shell::ShellState;
