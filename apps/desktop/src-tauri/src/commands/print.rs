//! # Print Commands
//!
//! `print_html` runs a caller-built document. `print_receipt` and
//! `print_queue_ticket` render the document from the cached print settings
//! and send it to the configured printer.

use tauri::State;

use medx_core::receipt::{PrintSettings, QueueTicket, ReceiptPayload};
use medx_core::{PrintOutcome, PrintRequest, PrinterInfo};

use crate::error::ApiError;
use crate::host::ScriptReply;
use crate::state::{PrintState, TemplatedPrint};

#[tauri::command]
pub async fn print_html(
    print: State<'_, PrintState>,
    request: PrintRequest,
) -> Result<PrintOutcome, ApiError> {
    Ok(print.pipeline().print_html(&request).await)
}

#[tauri::command]
pub async fn list_printers(print: State<'_, PrintState>) -> Result<Vec<PrinterInfo>, ApiError> {
    Ok(print.pipeline().list_printers().await)
}

#[tauri::command]
pub async fn get_print_settings(print: State<'_, PrintState>) -> Result<PrintSettings, ApiError> {
    Ok(print.settings())
}

/// Caches the settings and echoes them back with defaults applied.
#[tauri::command]
pub async fn set_print_settings(
    print: State<'_, PrintState>,
    settings: PrintSettings,
) -> Result<PrintSettings, ApiError> {
    print.set_settings(settings.clone());
    Ok(settings)
}

#[tauri::command]
pub async fn print_receipt(
    print: State<'_, PrintState>,
    job: TemplatedPrint<ReceiptPayload>,
) -> Result<PrintOutcome, ApiError> {
    Ok(print.print_receipt(job).await)
}

#[tauri::command]
pub async fn print_queue_ticket(
    print: State<'_, PrintState>,
    job: TemplatedPrint<QueueTicket>,
) -> Result<PrintOutcome, ApiError> {
    Ok(print.print_queue_ticket(job).await)
}

/// Result of a script evaluated in a print window. Only print windows
/// call this.
#[tauri::command]
pub async fn print_surface_reply(
    print: State<'_, PrintState>,
    reply: ScriptReply,
) -> Result<(), ApiError> {
    print.reply(reply);
    Ok(())
}
