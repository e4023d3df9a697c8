//! # Webview Print Host
//!
//! Print surfaces backed by Tauri webview windows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open_surface(visible)                                                  │
//! │     └─► window "print-<uuid>" on print.html, waits for page load        │
//! │         silent: hidden, unfocused, off-screen, no taskbar entry         │
//! │                                                                         │
//! │  load_html      ──► document.open / write / close                       │
//! │  wait_for_assets──► fonts.ready + pending <img> + two frames            │
//! │  measure_px     ──► max of scroll/offset/client extents                 │
//! │  capture_png    ──► SVG foreignObject snapshot drawn on a canvas        │
//! │                                                                         │
//! │  print (silent) ──► measure ─► capture at dpi/96 ─► PNG ─► Spooler (lp) │
//! │  print_dialog   ──► window.print(), resolves on afterprint              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every script runs through the [`ScriptBridge`]; the page itself never
//! touches the disk.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tauri::webview::PageLoadEvent;
use tauri::{AppHandle, Runtime, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use medx_core::paper::{
    capture_extent, CSS_PX_PER_INCH, MAX_CAPTURE_HEIGHT_PX, MAX_CAPTURE_WIDTH_PX,
};
use medx_supervisor::error::{SupervisorError, SupervisorResult};
use medx_supervisor::print::{HostPrinter, PrintHost, PrintOptions, PrintSurface};

use super::{HostError, ScriptBridge, Spooler};

const LOAD_JS: &str = include_str!("js/load.js");
const SETTLE_JS: &str = include_str!("js/settle.js");
const MEASURE_JS: &str = include_str!("js/measure.js");
const CAPTURE_JS: &str = include_str!("js/capture.js");
const DIALOG_JS: &str = include_str!("js/dialog.js");

/// Upper bound on one scripted step.
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(20);

/// The dialog stays open as long as the operator needs.
const DIALOG_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Window operations a print surface needs.
pub trait SurfaceWindow: Send + Sync {
    /// Evaluates a script without waiting for it.
    fn eval(&self, script: &str) -> Result<(), HostError>;

    fn show(&self) -> Result<(), HostError>;

    fn close(&self) -> Result<(), HostError>;
}

impl<R: Runtime> SurfaceWindow for WebviewWindow<R> {
    fn eval(&self, script: &str) -> Result<(), HostError> {
        WebviewWindow::eval(self, script)?;
        Ok(())
    }

    fn show(&self) -> Result<(), HostError> {
        WebviewWindow::show(self)?;
        Ok(())
    }

    fn close(&self) -> Result<(), HostError> {
        WebviewWindow::close(self)?;
        Ok(())
    }
}

// =============================================================================
// Surface
// =============================================================================

#[derive(Debug, Deserialize)]
struct Extent {
    width: f64,
    height: f64,
}

/// One print window.
pub struct WebviewSurface {
    window: Box<dyn SurfaceWindow>,
    bridge: Arc<ScriptBridge>,
    spooler: Spooler,
}

impl WebviewSurface {
    pub fn new(
        window: impl SurfaceWindow + 'static,
        bridge: Arc<ScriptBridge>,
        spooler: Spooler,
    ) -> Self {
        WebviewSurface {
            window: Box::new(window),
            bridge,
            spooler,
        }
    }

    async fn run(&self, body: &str, limit: Duration) -> Result<serde_json::Value, HostError> {
        self.bridge.call(self.window.as_ref(), body, limit).await
    }

    async fn extent(&self) -> Result<Extent, HostError> {
        let value = self.run(MEASURE_JS, SCRIPT_TIMEOUT).await?;
        serde_json::from_value(value).map_err(|e| HostError::Script(e.to_string()))
    }

    /// PNG data URL of the top-left `width`×`height` px at `scale`.
    async fn snapshot(&self, width: u32, height: u32, scale: f64) -> Result<String, HostError> {
        let script = CAPTURE_JS
            .replace("__WIDTH__", &width.to_string())
            .replace("__HEIGHT__", &height.to_string())
            .replace("__SCALE__", &scale.to_string());
        match self.run(&script, SCRIPT_TIMEOUT).await? {
            serde_json::Value::String(url) if url.starts_with(PNG_DATA_URL_PREFIX) => Ok(url),
            other => Err(HostError::Script(format!(
                "capture returned {}",
                truncate(&other.to_string(), 64)
            ))),
        }
    }

    async fn render_page(&self, options: &PrintOptions) -> Result<Vec<u8>, HostError> {
        let extent = self.extent().await?;
        let (width, height) = capture_extent(extent.width, extent.height);
        let scale = capture_scale(options.dpi, width, height);
        let url = self.snapshot(width, height, scale).await?;
        debug!(width, height, scale, "Page captured for spooling");
        decode_png_data_url(&url)
    }
}

#[async_trait]
impl PrintSurface for WebviewSurface {
    async fn load_html(&mut self, html: &str) -> SupervisorResult<()> {
        let literal = serde_json::to_string(html)
            .map_err(|e| SupervisorError::SurfaceFailed(e.to_string()))?;
        self.run(&LOAD_JS.replace("__HTML__", &literal), SCRIPT_TIMEOUT)
            .await
            .map_err(surface_failed)?;
        Ok(())
    }

    async fn wait_for_assets(&mut self) -> SupervisorResult<()> {
        self.run(SETTLE_JS, SCRIPT_TIMEOUT)
            .await
            .map_err(surface_failed)?;
        Ok(())
    }

    async fn show_inactive(&mut self) -> SupervisorResult<()> {
        self.window.show().map_err(surface_failed)
    }

    async fn measure_px(&mut self) -> SupervisorResult<(f64, f64)> {
        let extent = self.extent().await.map_err(surface_failed)?;
        Ok((extent.width, extent.height))
    }

    async fn capture_png(&mut self, width: u32, height: u32) -> SupervisorResult<String> {
        self.snapshot(width, height, 1.0)
            .await
            .map_err(surface_failed)
    }

    async fn print(&mut self, options: &PrintOptions) -> SupervisorResult<()> {
        let png = self.render_page(options).await.map_err(print_failed)?;
        self.spooler
            .submit_png(&png, options)
            .await
            .map_err(print_failed)
    }

    async fn print_dialog(&mut self) -> SupervisorResult<()> {
        self.run(DIALOG_JS, DIALOG_TIMEOUT)
            .await
            .map_err(print_failed)?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.window.close() {
            debug!(error = %e, "Print window already gone");
        }
    }
}

fn surface_failed(err: HostError) -> SupervisorError {
    SupervisorError::SurfaceFailed(err.to_string())
}

fn print_failed(err: HostError) -> SupervisorError {
    SupervisorError::PrintFailed(err.to_string())
}

/// Device pixels per CSS pixel, kept inside the capture limits.
fn capture_scale(dpi: Option<u32>, width: u32, height: u32) -> f64 {
    let wanted = dpi.map_or(1.0, |dpi| dpi as f64 / CSS_PX_PER_INCH);
    wanted
        .min(MAX_CAPTURE_WIDTH_PX as f64 / width.max(1) as f64)
        .min(MAX_CAPTURE_HEIGHT_PX as f64 / height.max(1) as f64)
        .max(1.0)
}

fn decode_png_data_url(url: &str) -> Result<Vec<u8>, HostError> {
    let payload = url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or_else(|| HostError::Script("capture is not a PNG data URL".into()))?;
    STANDARD
        .decode(payload)
        .map_err(|e| HostError::Script(format!("capture is not valid base64: {}", e)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

// =============================================================================
// Host
// =============================================================================

/// Opens print windows on the running app.
pub struct WebviewPrintHost<R: Runtime> {
    app: AppHandle<R>,
    bridge: Arc<ScriptBridge>,
    spooler: Spooler,
}

impl<R: Runtime> WebviewPrintHost<R> {
    pub fn new(app: AppHandle<R>, bridge: Arc<ScriptBridge>, spooler: Spooler) -> Self {
        WebviewPrintHost {
            app,
            bridge,
            spooler,
        }
    }

    fn build_window(
        &self,
        label: &str,
        visible: bool,
        loaded: oneshot::Sender<()>,
    ) -> Result<WebviewWindow<R>, HostError> {
        let loaded = Mutex::new(Some(loaded));
        let builder =
            WebviewWindowBuilder::new(&self.app, label, WebviewUrl::App("print.html".into()))
                .title("MedX Print")
                .inner_size(640.0, 900.0)
                .visible(visible)
                .focused(visible)
                .skip_taskbar(!visible)
                .on_page_load(move |_window, payload| {
                    if payload.event() == PageLoadEvent::Finished {
                        let sender = loaded.lock().ok().and_then(|mut slot| slot.take());
                        if let Some(sender) = sender {
                            let _ = sender.send(());
                        }
                    }
                });
        let builder = if visible {
            builder.center()
        } else {
            builder.position(-20_000.0, -20_000.0)
        };
        Ok(builder.build()?)
    }
}

#[async_trait]
impl<R: Runtime> PrintHost for WebviewPrintHost<R> {
    async fn list_printers(&self) -> SupervisorResult<Vec<HostPrinter>> {
        self.spooler.list_printers().await.map_err(print_failed)
    }

    async fn open_surface(&self, visible: bool) -> SupervisorResult<Box<dyn PrintSurface>> {
        let label = format!("print-{}", Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        let window = self
            .build_window(&label, visible, tx)
            .map_err(surface_failed)?;

        if !matches!(tokio::time::timeout(PAGE_LOAD_TIMEOUT, rx).await, Ok(Ok(()))) {
            warn!(%label, "Print window did not load");
            let _ = window.close();
            return Err(SupervisorError::SurfaceFailed(
                "print window did not load".into(),
            ));
        }

        debug!(%label, visible, "Print window ready");
        Ok(Box::new(WebviewSurface::new(
            window,
            self.bridge.clone(),
            self.spooler.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::bridge::request_id_of;
    use crate::host::ScriptReply;
    use medx_core::paper::PaperSize;
    use medx_core::{PrintMode, PrintRequest};
    use medx_supervisor::config::PrintTimings;
    use medx_supervisor::print::PrintPipeline;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[cfg(unix)]
    use crate::host::fake_program;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nreceipt";

    /// Window that answers each helper script like a browser would.
    struct ScriptedWindow {
        bridge: Arc<ScriptBridge>,
        height: f64,
        scripts: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedWindow {
        fn answer(&self, script: &str) -> Value {
            if script.contains("document.write") {
                json!(true)
            } else if script.contains("foreignObject") {
                json!(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(PNG)))
            } else if script.contains("scrollHeight") {
                json!({ "width": 302.0, "height": self.height })
            } else {
                json!(true)
            }
        }
    }

    impl SurfaceWindow for ScriptedWindow {
        fn eval(&self, script: &str) -> Result<(), HostError> {
            self.scripts.lock().unwrap().push(script.to_string());
            let request_id = request_id_of(script).unwrap();
            let value = self.answer(script);
            self.bridge.resolve(ScriptReply {
                request_id,
                ok: true,
                value,
            });
            Ok(())
        }

        fn show(&self) -> Result<(), HostError> {
            Ok(())
        }

        fn close(&self) -> Result<(), HostError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedHost {
        bridge: Arc<ScriptBridge>,
        spooler: Spooler,
        height: f64,
        scripts: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedHost {
        fn new(spooler: Spooler, height: f64) -> Self {
            ScriptedHost {
                bridge: Arc::new(ScriptBridge::new()),
                spooler,
                height,
                scripts: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }

        fn scripts(&self) -> Vec<String> {
            self.scripts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PrintHost for ScriptedHost {
        async fn list_printers(&self) -> SupervisorResult<Vec<HostPrinter>> {
            Ok(Vec::new())
        }

        async fn open_surface(&self, _visible: bool) -> SupervisorResult<Box<dyn PrintSurface>> {
            let window = ScriptedWindow {
                bridge: self.bridge.clone(),
                height: self.height,
                scripts: self.scripts.clone(),
                closed: self.closed.clone(),
            };
            Ok(Box::new(WebviewSurface::new(
                window,
                self.bridge.clone(),
                self.spooler.clone(),
            )))
        }
    }

    fn timings() -> PrintTimings {
        PrintTimings {
            settle_timeout_ms: 500,
            repaint_ms: 1,
            completion_timeout_ms: 5_000,
            drain_ms: 1,
        }
    }

    fn request(mode: PrintMode, silent: bool) -> PrintRequest {
        PrintRequest {
            html: "<div class=\"receipt\">Total 120 000</div>".into(),
            silent,
            device_name: Some("XP-80".into()),
            paper_size: Some(PaperSize::Mm80),
            scale_factor: None,
            mode,
        }
    }

    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect()
    }

    /// lp stand-in recording its arguments and the spooled page.
    #[cfg(unix)]
    fn recording_lp(dir: &Path) -> String {
        fake_program(
            dir,
            "lp",
            "out=\"$(dirname \"$0\")\"; echo \"$@\" > \"$out/args\"; \
             for last; do :; done; cp \"$last\" \"$out/spooled.png\"; \
             echo 'request id is XP-80-7 (1 file(s))'",
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_job_spools_measured_page() {
        let bin = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let spooler = Spooler::default()
            .with_programs(recording_lp(bin.path()), "lpstat")
            .with_spool_dir(spool.path().to_path_buf());
        let host = Arc::new(ScriptedHost::new(spooler, 600.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline.print_html(&request(PrintMode::Html, true)).await;
        assert!(outcome.ok, "{}", outcome.failure_reason);
        assert_eq!(outcome.debug.height_microns, Some(163_750));

        let args = std::fs::read_to_string(bin.path().join("args")).unwrap();
        assert!(args.contains("-d XP-80"), "{}", args);
        assert!(args.contains("media=Custom.80x163.75mm"), "{}", args);
        assert!(args.contains("Resolution=203dpi"), "{}", args);
        assert_eq!(std::fs::read(bin.path().join("spooled.png")).unwrap(), PNG);

        let scripts = host.scripts();
        let captures: Vec<_> = scripts.iter().filter(|s| s.contains("foreignObject")).collect();
        assert_eq!(captures.len(), 1);
        assert!(captures[0].contains("const height = 600;"));
        assert!(captures[0].contains("const scale = 2.11"));
        assert!(scripts[0].contains("Total 120 000"));

        assert!(host.closed.load(Ordering::SeqCst));
        assert!(leftovers(spool.path()).is_empty());
        assert_eq!(host.bridge.pending_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_image_mode_prints_the_capture() {
        let bin = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let spooler = Spooler::default()
            .with_programs(recording_lp(bin.path()), "lpstat")
            .with_spool_dir(spool.path().to_path_buf());
        let host = Arc::new(ScriptedHost::new(spooler, 600.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline.print_html(&request(PrintMode::Image, true)).await;
        assert!(outcome.ok, "{}", outcome.failure_reason);

        let scripts = host.scripts();
        let loads: Vec<_> = scripts.iter().filter(|s| s.contains("document.write")).collect();
        assert_eq!(loads.len(), 2);
        assert!(loads[1].contains(PNG_DATA_URL_PREFIX));
        assert!(loads[1].contains("size: 80mm auto"));

        let captures: Vec<_> = scripts.iter().filter(|s| s.contains("foreignObject")).collect();
        assert_eq!(captures.len(), 2);
        assert!(captures[0].contains("const scale = 1;"));
        assert_eq!(std::fs::read(bin.path().join("spooled.png")).unwrap(), PNG);
        assert!(leftovers(spool.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spooler_failure_fails_the_job() {
        let bin = tempfile::tempdir().unwrap();
        let lp = fake_program(bin.path(), "lp", "echo 'lp: printer XP-80 is offline' >&2; exit 1");
        let spooler = Spooler::default()
            .with_programs(lp, "lpstat")
            .with_spool_dir(bin.path().to_path_buf());
        let host = Arc::new(ScriptedHost::new(spooler, 600.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline.print_html(&request(PrintMode::Html, true)).await;
        assert!(!outcome.ok);
        assert!(outcome.failure_reason.contains("offline"), "{}", outcome.failure_reason);
        assert!(host.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dialog_prints_in_the_window() {
        let spool = tempfile::tempdir().unwrap();
        let spooler = Spooler::default()
            .with_programs("/nonexistent/lp", "/nonexistent/lpstat")
            .with_spool_dir(spool.path().to_path_buf());
        let host = Arc::new(ScriptedHost::new(spooler, 600.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline.print_html(&request(PrintMode::Html, false)).await;
        assert!(outcome.ok, "{}", outcome.failure_reason);

        let scripts = host.scripts();
        assert!(scripts.iter().any(|s| s.contains("window.print()")));
        assert!(scripts.iter().any(|s| s.contains("afterprint")));
        assert!(!scripts.iter().any(|s| s.contains("foreignObject")));
        assert!(host.closed.load(Ordering::SeqCst));
        assert!(leftovers(spool.path()).is_empty());
    }

    #[test]
    fn test_capture_scale_stays_in_limits() {
        assert!((capture_scale(Some(203), 302, 600) - 203.0 / 96.0).abs() < 1e-9);
        assert_eq!(capture_scale(None, 302, 600), 1.0);
        assert_eq!(capture_scale(Some(203), 302, 12_000), 1.0);
        assert_eq!(capture_scale(Some(600), 2_000, 100), 2.0);
    }

    #[test]
    fn test_decode_rejects_other_urls() {
        assert!(decode_png_data_url("data:image/jpeg;base64,AAAA").is_err());
        assert!(decode_png_data_url("data:image/png;base64,***").is_err());
        let url = format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(PNG));
        assert_eq!(decode_png_data_url(&url).unwrap(), PNG);
    }
}
