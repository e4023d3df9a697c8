//! # CUPS Spooler
//!
//! Hands rendered pages to CUPS and lists its printers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list_printers ──► lpstat -l -p -d ──► parse_lpstat                    │
//! │                                                                         │
//! │  submit_png    ──► temp file medx-print-*.png in the spool dir          │
//! │                    lp -d <device> -o media=Custom.<w>x<h>mm             │
//! │                       -o page-{left,right,top,bottom}=0 -o fit-to-page  │
//! │                       -o scaling=<n> -o Resolution=203dpi <file>        │
//! │                    exit 0 ──► job accepted, temp file removed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{debug, info};

use medx_supervisor::print::{HostPrinter, MarginType, PrintOptions};

use super::HostError;

/// IPP printer-state values.
const STATE_IDLE: i32 = 3;
const STATE_PROCESSING: i32 = 4;
const STATE_STOPPED: i32 = 5;

/// The CUPS command line tools.
#[derive(Debug, Clone)]
pub struct Spooler {
    lp_program: String,
    lpstat_program: String,
    spool_dir: PathBuf,
}

impl Default for Spooler {
    fn default() -> Self {
        Spooler {
            lp_program: "lp".to_string(),
            lpstat_program: "lpstat".to_string(),
            spool_dir: std::env::temp_dir(),
        }
    }
}

impl Spooler {
    /// Uses other programs in place of `lp` / `lpstat`.
    pub fn with_programs(mut self, lp: impl Into<String>, lpstat: impl Into<String>) -> Self {
        self.lp_program = lp.into();
        self.lpstat_program = lpstat.into();
        self
    }

    pub fn with_spool_dir(mut self, dir: PathBuf) -> Self {
        self.spool_dir = dir;
        self
    }

    pub async fn list_printers(&self) -> Result<Vec<HostPrinter>, HostError> {
        let output = run(&self.lpstat_program, &["-l", "-p", "-d"]).await?;
        Ok(parse_lpstat(&output))
    }

    /// Submits one PNG page; returns once `lp` has queued it.
    pub async fn submit_png(&self, png: &[u8], options: &PrintOptions) -> Result<(), HostError> {
        // Removed on drop; lp has copied the file once it exits.
        let spool = tempfile::Builder::new()
            .prefix("medx-print-")
            .suffix(".png")
            .tempfile_in(&self.spool_dir)?;
        tokio::fs::write(spool.path(), png).await?;

        let args = lp_args(options, &spool.path().display().to_string());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(program = %self.lp_program, ?args, bytes = png.len(), "Submitting print job");

        let stdout = run(&self.lp_program, &arg_refs).await?;
        info!(response = %stdout.trim(), "Print job accepted");
        Ok(())
    }
}

/// Runs a program and returns its stdout; a non-zero exit is an error
/// carrying stderr.
async fn run(program: &str, args: &[&str]) -> Result<String, HostError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(HostError::Failed {
            program: program.to_string(),
            message: if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            },
        })
    }
}

// =============================================================================
// Command Line Mapping
// =============================================================================

/// Formats microns as millimetres with at most two decimals.
fn microns_to_mm(microns: u32) -> String {
    let mm = format!("{:.2}", microns as f64 / 1000.0);
    mm.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `lp` arguments for a job; `file` comes last.
pub fn lp_args(options: &PrintOptions, file: &str) -> Vec<String> {
    let mut args = vec!["-t".to_string(), "MedX".to_string()];

    if let Some(device) = &options.device_name {
        args.push("-d".into());
        args.push(device.clone());
    }

    let mut opt = |value: String| {
        args.push("-o".into());
        args.push(value);
    };

    if let Some(page) = options.page_size {
        opt(format!(
            "media=Custom.{}x{}mm",
            microns_to_mm(page.width_microns),
            microns_to_mm(page.height_microns)
        ));
    }
    if options.margins == MarginType::None {
        for side in ["left", "right", "top", "bottom"] {
            opt(format!("page-{}=0", side));
        }
    }
    // The page is a capture of the laid-out receipt.
    opt("fit-to-page".into());
    if options.landscape {
        opt("landscape".into());
    }
    if (options.scale_factor - 100.0).abs() > f64::EPSILON {
        opt(format!("scaling={}", options.scale_factor.round() as u32));
    }
    if let Some(dpi) = options.dpi {
        opt(format!("Resolution={}dpi", dpi));
    }

    args.push(file.to_string());
    args
}

/// Parses `lpstat -l -p -d` output.
pub fn parse_lpstat(output: &str) -> Vec<HostPrinter> {
    let mut printers: Vec<HostPrinter> = Vec::new();
    let mut default_name: Option<String> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("printer ") {
            let mut words = rest.split_whitespace();
            let Some(name) = words.next() else { continue };
            let status = if rest.contains("disabled") {
                STATE_STOPPED
            } else if rest.contains("now printing") {
                STATE_PROCESSING
            } else {
                STATE_IDLE
            };
            printers.push(HostPrinter {
                name: name.to_string(),
                status: Some(status),
                ..Default::default()
            });
        } else if let Some(rest) = line.strip_prefix("system default destination:") {
            default_name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.trim_start().strip_prefix("Description:") {
            if let Some(last) = printers.last_mut() {
                let description = rest.trim();
                if !description.is_empty() {
                    last.display_name = Some(description.to_string());
                    last.description = Some(description.to_string());
                }
            }
        }
    }

    if let Some(default_name) = default_name {
        for printer in &mut printers {
            printer.is_default = printer.name == default_name;
        }
    }
    printers
}

#[cfg(test)]
mod tests {
    use super::*;
    use medx_core::paper::PageSize;
    use std::path::Path;

    #[cfg(unix)]
    use crate::host::fake_program;

    const LPSTAT: &str = "printer XP-80 is idle.  enabled since Mon 06 Jan 2025 09:12:03\n\
\tForm mounted:\n\
\tDescription: Xprinter XP-80\n\
\tLocation: Reception\n\
printer Office disabled since Mon 06 Jan 2025 09:12:03 -\n\
\treason unknown\n\
\tDescription: \n\
printer XP-58 now printing XP-58-12.  enabled since Mon 06 Jan 2025 09:12:03\n\
system default destination: XP-80\n";

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn options() -> PrintOptions {
        PrintOptions {
            silent: true,
            device_name: Some("XP-80".into()),
            print_background: true,
            margins: MarginType::None,
            landscape: false,
            scale_factor: 100.0,
            page_size: Some(PageSize {
                width_microns: 80_000,
                height_microns: 269_584,
            }),
            dpi: Some(203),
        }
    }

    #[test]
    fn test_parse_lpstat() {
        let printers = parse_lpstat(LPSTAT);
        assert_eq!(printers.len(), 3);

        assert_eq!(printers[0].name, "XP-80");
        assert_eq!(printers[0].display_name.as_deref(), Some("Xprinter XP-80"));
        assert!(printers[0].is_default);
        assert_eq!(printers[0].status, Some(STATE_IDLE));

        assert_eq!(printers[1].name, "Office");
        assert_eq!(printers[1].display_name, None);
        assert_eq!(printers[1].status, Some(STATE_STOPPED));

        assert_eq!(printers[2].status, Some(STATE_PROCESSING));
        assert!(!printers[2].is_default);
    }

    #[test]
    fn test_lp_args() {
        let args = lp_args(&options(), "/tmp/job.png");
        assert_eq!(
            args,
            vec![
                "-t", "MedX", "-d", "XP-80",
                "-o", "media=Custom.80x269.58mm",
                "-o", "page-left=0", "-o", "page-right=0",
                "-o", "page-top=0", "-o", "page-bottom=0",
                "-o", "fit-to-page",
                "-o", "Resolution=203dpi",
                "/tmp/job.png",
            ]
        );
    }

    #[test]
    fn test_lp_args_without_paper() {
        let mut opts = options();
        opts.device_name = None;
        opts.page_size = None;
        opts.dpi = None;
        opts.scale_factor = 150.0;
        let args = lp_args(&opts, "job.png");
        assert!(!args.contains(&"-d".to_string()));
        assert!(args.contains(&"scaling=150".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("media=")));
    }

    #[cfg(unix)]
    fn spool_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("medx-print-"))
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_submit_png_through_lp() {
        let dir = tempfile::tempdir().unwrap();
        let spool_dir = dir.path().join("spool");
        std::fs::create_dir_all(&spool_dir).unwrap();
        let lp = fake_program(
            dir.path(),
            "lp",
            "for last; do :; done; cp \"$last\" \"$(dirname \"$0\")/spooled.png\"; echo 'request id is XP-80-1 (1 file(s))'",
        );
        let spooler = Spooler::default()
            .with_programs(lp, "lpstat")
            .with_spool_dir(spool_dir.clone());

        spooler.submit_png(PNG, &options()).await.unwrap();

        let spooled = std::fs::read(dir.path().join("spooled.png")).unwrap();
        assert_eq!(spooled, PNG);
        assert!(spool_files(&spool_dir).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lp_failure_keeps_no_spool_file() {
        let dir = tempfile::tempdir().unwrap();
        let lp = fake_program(dir.path(), "lp", "echo 'lp: The printer or class does not exist.' >&2; exit 1");
        let spooler = Spooler::default()
            .with_programs(lp, "lpstat")
            .with_spool_dir(dir.path().to_path_buf());

        let err = spooler.submit_png(PNG, &options()).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}", err);
        assert!(spool_files(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_printers_runs_lpstat() {
        let dir = tempfile::tempdir().unwrap();
        let lpstat = fake_program(
            dir.path(),
            "lpstat",
            "printf 'printer XP-58 is idle.  enabled since today\\nsystem default destination: XP-58\\n'",
        );
        let spooler = Spooler::default().with_programs("lp", lpstat);

        let printers = spooler.list_printers().await.unwrap();
        assert_eq!(printers.len(), 1);
        assert!(printers[0].is_default);
    }
}
