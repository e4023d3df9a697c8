//! Test doubles shared by the state and boot tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use medx_supervisor::config::PathSettings;
use medx_supervisor::{
    HostPrinter, PrintHost, PrintOptions, PrintPipeline, PrintSurface, ProcessLauncher,
    ShellConfig, ShellEvent, ShellEvents, Supervisor, SupervisorResult,
};

use crate::host::{HostError, Opener, ScriptBridge};
use crate::state::{PrintState, ServiceState, ShellState};

pub const VALID_ENV: &str = "DATABASE_URL=postgresql+asyncpg://clinic:pw@127.0.0.1:5432/medx\nSECRET_KEY=0123456789abcdef0123456789abcdef\n";

/// Surface that accepts everything and measures 300×600.
struct StubSurface;

#[async_trait]
impl PrintSurface for StubSurface {
    async fn load_html(&mut self, _html: &str) -> SupervisorResult<()> {
        Ok(())
    }
    async fn wait_for_assets(&mut self) -> SupervisorResult<()> {
        Ok(())
    }
    async fn show_inactive(&mut self) -> SupervisorResult<()> {
        Ok(())
    }
    async fn measure_px(&mut self) -> SupervisorResult<(f64, f64)> {
        Ok((300.0, 600.0))
    }
    async fn capture_png(&mut self, _w: u32, _h: u32) -> SupervisorResult<String> {
        Ok("data:image/png;base64,".into())
    }
    async fn print(&mut self, _options: &PrintOptions) -> SupervisorResult<()> {
        Ok(())
    }
    async fn print_dialog(&mut self) -> SupervisorResult<()> {
        Ok(())
    }
    async fn close(&mut self) {}
}

pub struct StubHost;

#[async_trait]
impl PrintHost for StubHost {
    async fn list_printers(&self) -> SupervisorResult<Vec<HostPrinter>> {
        Ok(vec![HostPrinter {
            name: "XP-80".into(),
            is_default: true,
            ..Default::default()
        }])
    }
    async fn open_surface(&self, _visible: bool) -> SupervisorResult<Box<dyn PrintSurface>> {
        Ok(Box::new(StubSurface))
    }
}

#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<PathBuf>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }
}

impl Opener for RecordingOpener {
    fn open(&self, target: &Path) -> Result<(), HostError> {
        self.opened.lock().unwrap().push(target.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ShellEvent>>,
}

impl RecordingEvents {
    /// Drains the recorded events.
    pub fn take(&self) -> Vec<ShellEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl ShellEvents for RecordingEvents {
    fn emit(&self, event: ShellEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// The managed states over a temp directory, services disabled.
pub struct Harness {
    pub services: ServiceState,
    pub print: PrintState,
    pub shell: ShellState,
    pub bridge: Arc<ScriptBridge>,
    pub opener: Arc<RecordingOpener>,
    pub events: Arc<RecordingEvents>,
}

impl Harness {
    pub fn write_env(&self, content: &str) {
        let paths = self.services.paths();
        std::fs::create_dir_all(paths.medx_dir()).unwrap();
        std::fs::write(paths.env_path(), content).unwrap();
    }
}

pub fn harness(root: &Path) -> Harness {
    let mut config = ShellConfig {
        paths: PathSettings {
            resources_dir: Some(root.join("resources")),
            user_data_dir: Some(root.join("user")),
            backend_dir: None,
        },
        ..Default::default()
    };
    config.services.disabled = true;
    config.services.start_after_save_ms = 1;
    config.print.drain_ms = 1;
    config.print.repaint_ms = 1;
    config.ui.start_url = Some("http://localhost:5173".into());
    std::fs::create_dir_all(root.join("resources")).unwrap();

    let events = Arc::new(RecordingEvents::default());
    let opener = Arc::new(RecordingOpener::default());
    let bridge = Arc::new(ScriptBridge::new());

    let supervisor = Supervisor::spawn(config.clone(), Arc::new(ProcessLauncher), events.clone());
    let config = Arc::new(config);

    Harness {
        services: ServiceState::new(supervisor, config.clone()),
        print: PrintState::new(
            PrintPipeline::new(Arc::new(StubHost), config.print.clone()),
            bridge.clone(),
        ),
        shell: ShellState::new(opener.clone(), events.clone(), config.ui.start_url.clone()),
        bridge,
        opener,
        events,
    }
}
