//! # Shell Types
//!
//! Types shared between the supervisor, the print pipeline and the UI.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Shell Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ServiceRole    │   │  ProcessState   │   │  ServiceStatus  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Backend :8000  │   │  NotRunning     │   │  role, state    │       │
//! │  │  License :8001  │   │  Spawning       │   │  restarts       │       │
//! │  └─────────────────┘   │  Running{pid}   │   │  port, log      │       │
//! │                        │  Exited{code}   │   └─────────────────┘       │
//! │                        │  CrashLooped    │                              │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  PrinterInfo    │   │  PrintRequest   │   │  PrintOutcome   │       │
//! │  │  name, default  │   │  html, silent   │   │  ok, reason     │       │
//! │  │  status, desc   │   │  device, paper  │   │  debug          │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::paper::PaperSize;
use crate::{BACKEND_PORT, LICENSE_PORT};

// =============================================================================
// Service Role
// =============================================================================

/// A local service the shell keeps alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceRole {
    /// The clinic REST backend. Essential.
    Backend,
    /// The license server. Optional.
    License,
}

impl ServiceRole {
    /// Every role, in start order.
    pub const ALL: [ServiceRole; 2] = [ServiceRole::Backend, ServiceRole::License];

    /// Port the service is expected to answer on.
    pub fn port(self) -> u16 {
        match self {
            ServiceRole::Backend => BACKEND_PORT,
            ServiceRole::License => LICENSE_PORT,
        }
    }

    /// Stable lowercase name (log file names, events).
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceRole::Backend => "backend",
            ServiceRole::License => "license",
        }
    }
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Process State
// =============================================================================

/// Lifecycle state of one managed service.
///
/// ```text
/// NotRunning ──spawn──► Spawning ──ok──► Running ──exit──► Exited
///      ▲                    │                                 │
///      └──── spawn error ───┘        budget exhausted ──► CrashLooped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(tag = "state", rename_all = "camelCase")]
#[ts(export)]
pub enum ProcessState {
    #[default]
    NotRunning,
    Spawning,
    Running { pid: Option<u32> },
    Exited { code: Option<i32> },
    CrashLooped,
}

impl ProcessState {
    /// True while a child process may be alive.
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::Spawning | ProcessState::Running { .. })
    }
}

/// Snapshot of one role, as shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceStatus {
    pub role: ServiceRole,
    pub state: ProcessState,
    pub port: u16,
    /// Automatic restarts inside the current window.
    pub restarts_in_window: u32,
    /// False while the role is intentionally not supervised.
    pub watched: bool,
    pub log_path: Option<String>,
}

// =============================================================================
// Printing
// =============================================================================

/// A printer as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrinterInfo {
    pub name: String,
    pub display_name: String,
    pub is_default: bool,
    pub status: Option<i32>,
    pub description: Option<String>,
}

impl PrinterInfo {
    /// Normalizes raw host fields: an empty display name falls back to the
    /// device name.
    pub fn normalized(
        name: impl Into<String>,
        display_name: Option<String>,
        is_default: bool,
        status: Option<i32>,
        description: Option<String>,
    ) -> Self {
        let name = name.into();
        let display_name = display_name
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| name.clone());
        PrinterInfo {
            name,
            display_name,
            is_default,
            status,
            description,
        }
    }
}

/// How a silent print job is delivered to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PrintMode {
    /// Print the HTML directly.
    #[default]
    Html,
    /// Rasterize to PNG first (drivers that mishandle HTML paint).
    Image,
}

impl std::fmt::Display for PrintMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrintMode::Html => f.write_str("html"),
            PrintMode::Image => f.write_str("image"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Payload of `print_html`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrintRequest {
    #[serde(default)]
    pub html: String,

    /// Silent hardware print (default) or the host print dialog.
    #[serde(default = "default_true")]
    pub silent: bool,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub paper_size: Option<PaperSize>,

    /// Percent, clamped to 10..=200.
    #[serde(default)]
    pub scale_factor: Option<f64>,

    #[serde(default)]
    pub mode: PrintMode,
}

impl PrintRequest {
    /// A silent HTML print with no device or paper preference.
    pub fn silent_html(html: impl Into<String>) -> Self {
        PrintRequest {
            html: html.into(),
            silent: true,
            device_name: None,
            paper_size: None,
            scale_factor: None,
            mode: PrintMode::Html,
        }
    }

    /// Device name, treating blank as "system default".
    pub fn device(&self) -> Option<&str> {
        self.device_name
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Diagnostics returned with every print result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrintDebug {
    pub device_name: Option<String>,
    pub paper_size: Option<PaperSize>,
    pub width_microns: Option<u32>,
    pub height_microns: Option<u32>,
    pub mode: PrintMode,
}

/// Result of `print_html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrintOutcome {
    pub ok: bool,
    pub failure_reason: String,
    pub debug: PrintDebug,
}

impl PrintOutcome {
    /// A failed outcome with the given reason.
    pub fn failed(reason: impl Into<String>, debug: PrintDebug) -> Self {
        PrintOutcome {
            ok: false,
            failure_reason: reason.into(),
            debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ports() {
        assert_eq!(ServiceRole::Backend.port(), 8000);
        assert_eq!(ServiceRole::License.port(), 8001);
        assert_eq!(ServiceRole::License.to_string(), "license");
    }

    #[test]
    fn test_process_state_serialization() {
        let json = serde_json::to_value(ProcessState::Running { pid: Some(42) }).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["pid"], 42);
        assert!(ProcessState::Spawning.is_active());
        assert!(!ProcessState::CrashLooped.is_active());
    }

    #[test]
    fn test_print_request_defaults() {
        let req: PrintRequest = serde_json::from_str(r#"{"html":"<p>x</p>"}"#).unwrap();
        assert!(req.silent);
        assert_eq!(req.mode, PrintMode::Html);
        assert_eq!(req.paper_size, None);
        assert_eq!(req.device(), None);

        let req: PrintRequest = serde_json::from_str(
            r#"{"html":"","silent":false,"deviceName":"  XP-80 ","paperSize":"58","mode":"image"}"#,
        )
        .unwrap();
        assert!(!req.silent);
        assert_eq!(req.device(), Some("XP-80"));
        assert_eq!(req.paper_size, Some(PaperSize::Mm58));
        assert_eq!(req.mode, PrintMode::Image);
    }

    #[test]
    fn test_printer_display_name_fallback() {
        let p = PrinterInfo::normalized("XP-58", Some("".into()), true, Some(0), None);
        assert_eq!(p.display_name, "XP-58");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["displayName"], "XP-58");
        assert_eq!(json["isDefault"], true);
    }
}
