//! # Tauri Commands Module
//!
//! All commands exposed to the web UI.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (exports)
//! ├── config.rs    ◄─── get_config, generate_secret, save_config,
//! │                     open_env_folder
//! ├── services.rs  ◄─── start_services, service_status, setup_closed,
//! │                     open_log_folder, start_url
//! └── print.rs     ◄─── print_html, list_printers, get/set_print_settings,
//!                       print_receipt, print_queue_ticket,
//!                       print_surface_reply (print windows only)
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Tauri Command Flow                                   │
//! │                                                                         │
//! │  Web UI                                                                 │
//! │  ──────                                                                 │
//! │  window.medx.configSave(form)                                           │
//! │    └─► invoke('save_config', { form: { db: 'medx', ... } })             │
//! │         │                                                               │
//! │         │ (IPC, JSON serialization)                                     │
//! │         ▼                                                               │
//! │  Rust Shell                                                             │
//! │  ──────────                                                             │
//! │  #[tauri::command]                                                      │
//! │  async fn save_config(                                                  │
//! │      services: State<'_, ServiceState>,  ◄── injected by Tauri          │
//! │      form: SetupForm,                    ◄── from JS                    │
//! │  ) -> Result<ConnectionConfig, ApiError>                                │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Promise resolves with the saved config or rejects with ApiError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands are thin; the work lives on the state types.

pub mod config;
pub mod print;
pub mod services;
