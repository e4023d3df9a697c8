//! # MedX Desktop Shell Entry Point
//!
//! ## Application Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MedX Desktop Shell                               │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Web UI (React)                              │  │
//! │  │  • Reception queue      • Cashier / receipts                     │  │
//! │  │  • Setup wizard         • Print settings                         │  │
//! │  └──────────────────────────────┬───────────────────────────────────┘  │
//! │                 invoke() / "medx://shell" events                       │
//! │                                 ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    Rust Shell (this crate)                       │  │
//! │  │                                                                  │  │
//! │  │  main.rs ────► Hands off to lib.rs                              │  │
//! │  │  lib.rs ─────► Logging, config, supervisor, Tauri setup         │  │
//! │  │  commands/ ──► #[tauri::command] handlers                       │  │
//! │  │  state/ ─────► ServiceState, PrintState, ShellState             │  │
//! │  │  windows.rs ─► main / setup windows, shell events               │  │
//! │  │  host/ ──────► Webview print host, lp spooler, OS opener        │  │
//! │  └──────────────────────────────┬───────────────────────────────────┘  │
//! │                                 ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │          medx-backend :8000      license server :8001            │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// Prevents an additional console window on Windows in release
#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

fn main() {
    // The actual setup is in lib.rs for better testability
    medx_desktop_lib::run();
}
