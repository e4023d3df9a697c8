//! # Print State
//!
//! The print pipeline plus the last print settings the UI pushed.
//!
//! The backend owns print settings; the UI sends a copy with
//! `set_print_settings` whenever it loads or saves them, so receipt
//! printing can read them synchronously.

use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::debug;

use medx_core::receipt::{
    build_queue_ticket_html, build_receipt_html, PrintSettings, QueueTicket, ReceiptPayload,
};
use medx_core::{PrintOutcome, PrintRequest};
use medx_supervisor::PrintPipeline;

use crate::host::{ScriptBridge, ScriptReply};

/// Payload of `print_receipt` / `print_queue_ticket`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatedPrint<T> {
    #[serde(flatten)]
    pub data: T,

    /// Silent by default; `false` opens the print dialog.
    #[serde(default)]
    pub silent: Option<bool>,
}

pub struct PrintState {
    pipeline: PrintPipeline,
    bridge: Arc<ScriptBridge>,
    settings: RwLock<PrintSettings>,
}

impl PrintState {
    pub fn new(pipeline: PrintPipeline, bridge: Arc<ScriptBridge>) -> Self {
        PrintState {
            pipeline,
            bridge,
            settings: RwLock::new(PrintSettings::default()),
        }
    }

    pub fn pipeline(&self) -> &PrintPipeline {
        &self.pipeline
    }

    /// Gets the cached settings.
    pub fn settings(&self) -> PrintSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Replaces the cached settings.
    pub fn set_settings(&self, settings: PrintSettings) {
        debug!(paper = ?settings.paper_size, template = ?settings.receipt_template_id, "Print settings cached");
        if let Ok(mut s) = self.settings.write() {
            *s = settings;
        }
    }

    /// Hands a print window's script result to the waiting job.
    pub fn reply(&self, reply: ScriptReply) {
        self.bridge.resolve(reply);
    }

    pub async fn print_receipt(&self, job: TemplatedPrint<ReceiptPayload>) -> PrintOutcome {
        let settings = self.settings();
        let html = build_receipt_html(&job.data, &settings);
        self.print_with_settings(html, &settings, job.silent).await
    }

    pub async fn print_queue_ticket(&self, job: TemplatedPrint<QueueTicket>) -> PrintOutcome {
        let settings = self.settings();
        let mut ticket = job.data;
        if ticket.created_at.is_none() {
            ticket.created_at = Some(chrono::Local::now().fixed_offset());
        }
        let html = build_queue_ticket_html(&ticket, &settings);
        self.print_with_settings(html, &settings, job.silent).await
    }

    async fn print_with_settings(
        &self,
        html: String,
        settings: &PrintSettings,
        silent: Option<bool>,
    ) -> PrintOutcome {
        let request = request_for(html, settings, silent.unwrap_or(true));
        self.pipeline.print_html(&request).await
    }
}

/// Print request carrying the preferred printer, paper and mode.
pub fn request_for(html: String, settings: &PrintSettings, silent: bool) -> PrintRequest {
    PrintRequest {
        html,
        silent,
        device_name: Some(settings.preferred_printer_device_name.clone())
            .filter(|d| !d.trim().is_empty()),
        paper_size: Some(settings.paper_size),
        scale_factor: Some(settings.silent_scale_percent),
        mode: settings.silent_print_mode,
    }
}
