//! # Print Pipeline
//!
//! Drives a host rendering surface through a thermal print job.
//!
//! ## Silent Job
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open offscreen surface                                                 │
//! │     │                                                                   │
//! │  load HTML ──► wait fonts/images ──► show_inactive + 80 ms              │
//! │     │                                                                   │
//! │  mode = image AND paper size set?                                       │
//! │     ├─yes─► measure rect ─► capture PNG (≤ 4000×12000) ─► reload as     │
//! │     │       <img> page ─► wait fonts/images   (failure ─► keep HTML)    │
//! │     ▼                                                                   │
//! │  paper size set? ──yes──► measure height ─► page size in microns        │
//! │     │                     (300 000 fallback)                            │
//! │     ▼                                                                   │
//! │  print(margins none, background on, scale 10..200, dpi 203)             │
//! │     │                                                                   │
//! │  await completion ──► drain 1.2 s ──► close                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The host (a browser engine, a print spooler) sits behind [`PrintHost`]
//! and [`PrintSurface`]. Each job owns its surface. There is no retry; a
//! failure is returned as a [`PrintOutcome`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use medx_core::paper::{
    capture_extent, clamp_scale_factor, page_height_microns, PageSize, PaperSize,
    FALLBACK_PAGE_HEIGHT_MICRONS, THERMAL_DPI,
};
use medx_core::{PrintDebug, PrintMode, PrintOutcome, PrintRequest, PrinterInfo};

use crate::config::PrintTimings;
use crate::error::{SupervisorError, SupervisorResult};

// =============================================================================
// Host Seams
// =============================================================================

/// Printer as reported by the host, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostPrinter {
    pub name: String,
    pub display_name: Option<String>,
    pub is_default: bool,
    pub status: Option<i32>,
    pub description: Option<String>,
}

/// Margin preset of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarginType {
    Default,
    None,
}

/// Options handed to the host print call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub silent: bool,
    pub device_name: Option<String>,
    pub print_background: bool,
    pub margins: MarginType,
    pub landscape: bool,
    pub scale_factor: f64,
    pub page_size: Option<PageSize>,
    pub dpi: Option<u32>,
}

/// One rendering surface (an offscreen or visible window).
#[async_trait]
pub trait PrintSurface: Send {
    /// Loads a complete HTML document.
    async fn load_html(&mut self, html: &str) -> SupervisorResult<()>;

    /// Resolves once fonts and images have loaded and layout settled.
    async fn wait_for_assets(&mut self) -> SupervisorResult<()>;

    /// Shows the surface without focusing it so it paints once.
    async fn show_inactive(&mut self) -> SupervisorResult<()>;

    /// Document width and height in CSS pixels.
    async fn measure_px(&mut self) -> SupervisorResult<(f64, f64)>;

    /// Rasterizes the top-left `width`×`height` px; returns a PNG data URL.
    async fn capture_png(&mut self, width: u32, height: u32) -> SupervisorResult<String>;

    /// Prints and resolves on the host's completion signal.
    async fn print(&mut self, options: &PrintOptions) -> SupervisorResult<()>;

    /// Opens the host print dialog and resolves when it closes.
    async fn print_dialog(&mut self) -> SupervisorResult<()>;

    async fn close(&mut self);
}

/// The host rendering/print environment.
#[async_trait]
pub trait PrintHost: Send + Sync {
    async fn list_printers(&self) -> SupervisorResult<Vec<HostPrinter>>;

    /// Opens a fresh surface; `visible` is false for silent jobs.
    async fn open_surface(&self, visible: bool) -> SupervisorResult<Box<dyn PrintSurface>>;
}

// =============================================================================
// Pipeline
// =============================================================================

/// Runs print jobs against a host.
#[derive(Clone)]
pub struct PrintPipeline {
    host: Arc<dyn PrintHost>,
    timings: PrintTimings,
}

impl PrintPipeline {
    pub fn new(host: Arc<dyn PrintHost>, timings: PrintTimings) -> Self {
        PrintPipeline { host, timings }
    }

    /// Printers known to the host. Errors yield an empty list.
    pub async fn list_printers(&self) -> Vec<PrinterInfo> {
        match self.host.list_printers().await {
            Ok(printers) => printers
                .into_iter()
                .map(|p| {
                    PrinterInfo::normalized(
                        p.name,
                        p.display_name,
                        p.is_default,
                        p.status,
                        p.description,
                    )
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list printers");
                Vec::new()
            }
        }
    }

    /// Prints an HTML document.
    pub async fn print_html(&self, request: &PrintRequest) -> PrintOutcome {
        let job_id = Uuid::new_v4();
        let span = tracing::info_span!("print_job", %job_id, mode = %request.mode);
        async move {
            let outcome = if request.silent {
                self.print_silent(request).await
            } else {
                self.print_interactive(request).await
            };
            if outcome.ok {
                info!("Print job completed");
            } else {
                warn!(reason = %outcome.failure_reason, "Print job failed");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn print_interactive(&self, request: &PrintRequest) -> PrintOutcome {
        let debug = PrintDebug {
            device_name: request.device().map(str::to_string),
            paper_size: request.paper_size,
            width_microns: request.paper_size.map(PaperSize::width_microns),
            height_microns: None,
            mode: request.mode,
        };

        let mut surface = match self.host.open_surface(true).await {
            Ok(surface) => surface,
            Err(e) => return PrintOutcome::failed(e.to_string(), debug),
        };

        let result = async {
            surface.load_html(&request.html).await?;
            self.settle(surface.as_mut()).await;
            surface.print_dialog().await
        }
        .await;
        surface.close().await;

        outcome_of(result, debug)
    }

    async fn print_silent(&self, request: &PrintRequest) -> PrintOutcome {
        let mut debug = PrintDebug {
            device_name: request.device().map(str::to_string),
            paper_size: request.paper_size,
            width_microns: request.paper_size.map(PaperSize::width_microns),
            height_microns: None,
            mode: request.mode,
        };

        let mut surface = match self.host.open_surface(false).await {
            Ok(surface) => surface,
            Err(e) => return PrintOutcome::failed(e.to_string(), debug),
        };

        let result = self.run_silent(surface.as_mut(), request, &mut debug).await;

        tokio::time::sleep(Duration::from_millis(self.timings.drain_ms)).await;
        surface.close().await;

        outcome_of(result, debug)
    }

    async fn run_silent(
        &self,
        surface: &mut dyn PrintSurface,
        request: &PrintRequest,
        debug: &mut PrintDebug,
    ) -> SupervisorResult<()> {
        surface.load_html(&request.html).await?;
        self.settle(surface).await;

        match surface.show_inactive().await {
            Ok(()) => tokio::time::sleep(Duration::from_millis(self.timings.repaint_ms)).await,
            Err(e) => debug!(error = %e, "Forced repaint unavailable"),
        }

        if let (PrintMode::Image, Some(paper)) = (request.mode, request.paper_size) {
            if let Err(e) = self.rasterize(surface, paper).await {
                warn!(error = %e, "Rasterizing failed, printing HTML");
            }
        }

        let page_size = match request.paper_size {
            Some(paper) => {
                let height_microns = match surface.measure_px().await {
                    Ok((_, h)) => page_height_microns(h),
                    Err(e) => {
                        debug!(error = %e, "Measuring failed, using fallback height");
                        FALLBACK_PAGE_HEIGHT_MICRONS
                    }
                };
                debug.height_microns = Some(height_microns);
                Some(PageSize {
                    width_microns: paper.width_microns(),
                    height_microns,
                })
            }
            None => None,
        };

        let options = PrintOptions {
            silent: true,
            device_name: debug.device_name.clone(),
            print_background: true,
            margins: MarginType::None,
            landscape: false,
            scale_factor: clamp_scale_factor(request.scale_factor),
            page_size,
            dpi: page_size.map(|_| THERMAL_DPI),
        };
        debug!(?options, "Sending job to printer");

        let timeout = Duration::from_millis(self.timings.completion_timeout_ms);
        match tokio::time::timeout(timeout, surface.print(&options)).await {
            Ok(result) => result,
            Err(_) => Err(SupervisorError::PrintTimeout(self.timings.completion_timeout_ms)),
        }
    }

    /// Replaces the loaded document with a PNG capture of itself.
    async fn rasterize(
        &self,
        surface: &mut dyn PrintSurface,
        paper: PaperSize,
    ) -> SupervisorResult<()> {
        let (w, h) = surface.measure_px().await?;
        let (width, height) = capture_extent(w, h);
        let png = surface.capture_png(width, height).await?;
        debug!(width, height, "Receipt rasterized");
        surface.load_html(&image_page_html(&png, paper)).await?;
        self.settle(surface).await;
        Ok(())
    }

    /// Waits for assets, bounded; a failure only costs layout accuracy.
    async fn settle(&self, surface: &mut dyn PrintSurface) {
        let limit = Duration::from_millis(self.timings.settle_timeout_ms);
        match tokio::time::timeout(limit, surface.wait_for_assets()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Waiting for assets failed"),
            Err(_) => debug!(?limit, "Assets did not settle in time"),
        }
    }
}

fn outcome_of(result: SupervisorResult<()>, debug: PrintDebug) -> PrintOutcome {
    match result {
        Ok(()) => PrintOutcome {
            ok: true,
            failure_reason: String::new(),
            debug,
        },
        Err(SupervisorError::PrintFailed(reason)) => PrintOutcome::failed(reason, debug),
        Err(e) => PrintOutcome::failed(e.to_string(), debug),
    }
}

/// Minimal page showing a captured receipt image at full paper width.
pub fn image_page_html(png_data_url: &str, paper: PaperSize) -> String {
    format!(
        r#"<!doctype html><html><head><meta charset="utf-8"/><style>
        @page {{ size: {}mm auto; margin: 0; }}
        html, body {{ margin: 0; padding: 0; background: #fff; }}
        img {{ display:block; width: 100%; height: auto; }}
      </style></head><body><img src="{}" alt="receipt"/></body></html>"#,
        paper.width_mm(),
        png_data_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePrintHost, SurfaceCall};

    fn timings() -> PrintTimings {
        PrintTimings {
            settle_timeout_ms: 100,
            repaint_ms: 1,
            completion_timeout_ms: 200,
            drain_ms: 1,
        }
    }

    fn request(mode: PrintMode, paper: Option<PaperSize>) -> PrintRequest {
        PrintRequest {
            html: "<p>receipt</p>".into(),
            silent: true,
            device_name: Some(" XP-80 ".into()),
            paper_size: paper,
            scale_factor: Some(500.0),
            mode,
        }
    }

    #[tokio::test]
    async fn test_silent_html_job() {
        let host = Arc::new(FakePrintHost::measuring(300.0, 1000.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline
            .print_html(&request(PrintMode::Html, Some(PaperSize::Mm80)))
            .await;

        assert!(outcome.ok, "{}", outcome.failure_reason);
        assert_eq!(outcome.debug.device_name.as_deref(), Some("XP-80"));
        assert_eq!(outcome.debug.width_microns, Some(80_000));
        assert_eq!(outcome.debug.height_microns, Some(269_584));

        let options = host.last_options().unwrap();
        assert!(options.silent);
        assert!(options.print_background);
        assert_eq!(options.margins, MarginType::None);
        assert_eq!(options.scale_factor, 200.0);
        assert_eq!(options.dpi, Some(203));
        assert_eq!(
            options.page_size,
            Some(PageSize {
                width_microns: 80_000,
                height_microns: 269_584
            })
        );

        let calls = host.calls();
        assert_eq!(calls.first(), Some(&SurfaceCall::Open { visible: false }));
        assert!(calls.contains(&SurfaceCall::ShowInactive));
        assert!(!calls.iter().any(|c| matches!(c, SurfaceCall::Capture { .. })));
        assert_eq!(calls.last(), Some(&SurfaceCall::Close));
    }

    #[tokio::test]
    async fn test_image_mode_rasterizes_first() {
        let host = Arc::new(FakePrintHost::measuring(20_000.0, 50_000.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline
            .print_html(&request(PrintMode::Image, Some(PaperSize::Mm58)))
            .await;
        assert!(outcome.ok);

        let calls = host.calls();
        assert!(calls.contains(&SurfaceCall::Capture {
            width: 4_000,
            height: 12_000
        }));
        let loads: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                SurfaceCall::Load(html) => Some(html.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(loads.len(), 2);
        assert!(loads[1].contains("size: 58mm auto"));
        assert!(loads[1].contains("data:image/png;base64,"));
        assert_eq!(outcome.debug.height_microns, Some(1_200_000));
    }

    #[tokio::test]
    async fn test_image_mode_needs_paper_size() {
        let host = Arc::new(FakePrintHost::measuring(300.0, 1000.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline.print_html(&request(PrintMode::Image, None)).await;
        assert!(outcome.ok);
        assert!(!host
            .calls()
            .iter()
            .any(|c| matches!(c, SurfaceCall::Capture { .. })));

        let options = host.last_options().unwrap();
        assert_eq!(options.page_size, None);
        assert_eq!(options.dpi, None);
        assert_eq!(outcome.debug.height_microns, None);
    }

    #[tokio::test]
    async fn test_measure_failure_uses_fallback_height() {
        let host = Arc::new(FakePrintHost::unmeasurable());
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline
            .print_html(&request(PrintMode::Html, Some(PaperSize::Mm80)))
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.debug.height_microns, Some(300_000));
    }

    #[tokio::test]
    async fn test_image_mode_falls_back_to_html() {
        let host = Arc::new(FakePrintHost::unmeasurable());
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline
            .print_html(&request(PrintMode::Image, Some(PaperSize::Mm80)))
            .await;
        assert!(outcome.ok);
        let calls = host.calls();
        assert!(!calls.iter().any(|c| matches!(c, SurfaceCall::Capture { .. })));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, SurfaceCall::Load(_))).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_driver_failure_is_reported() {
        let host = Arc::new(FakePrintHost::failing("Printer offline"));
        let pipeline = PrintPipeline::new(host.clone(), timings());

        let outcome = pipeline
            .print_html(&request(PrintMode::Html, Some(PaperSize::Mm80)))
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.failure_reason, "Printer offline");
        assert_eq!(host.calls().last(), Some(&SurfaceCall::Close));
    }

    #[tokio::test]
    async fn test_interactive_opens_dialog() {
        let host = Arc::new(FakePrintHost::measuring(300.0, 1000.0));
        let pipeline = PrintPipeline::new(host.clone(), timings());
        let mut req = request(PrintMode::Html, None);
        req.silent = false;

        let outcome = pipeline.print_html(&req).await;
        assert!(outcome.ok);
        let calls = host.calls();
        assert_eq!(calls.first(), Some(&SurfaceCall::Open { visible: true }));
        assert!(calls.contains(&SurfaceCall::Dialog));
        assert!(host.last_options().is_none());
    }

    #[tokio::test]
    async fn test_list_printers_normalizes() {
        let host = Arc::new(FakePrintHost::with_printers(vec![HostPrinter {
            name: "XP-58".into(),
            display_name: None,
            is_default: true,
            status: Some(0),
            description: None,
        }]));
        let pipeline = PrintPipeline::new(host, timings());

        let printers = pipeline.list_printers().await;
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0].display_name, "XP-58");
        assert!(printers[0].is_default);
    }

    #[tokio::test]
    async fn test_list_printers_error_is_empty() {
        let pipeline = PrintPipeline::new(Arc::new(FakePrintHost::broken()), timings());
        assert!(pipeline.list_printers().await.is_empty());
    }
}
