//! Test doubles for the launcher, event, restarter and print seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use medx_core::ServiceRole;

use crate::error::{SupervisorError, SupervisorResult};
use crate::events::{ShellEvent, ShellEvents};
use crate::launcher::{LaunchSpec, Launcher, ManagedChild};
use crate::print::{HostPrinter, PrintHost, PrintOptions, PrintSurface};
use crate::updates::ServiceRestarter;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

// =============================================================================
// Events
// =============================================================================

/// Records every emitted event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<ShellEvent>>,
    notify: Notify,
}

impl RecordingEvents {
    pub fn all(&self) -> Vec<ShellEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Waits until an event matching `pred` was emitted.
    pub async fn wait_for(&self, pred: impl Fn(&ShellEvent) -> bool) {
        self.wait_for_count(pred, 1).await
    }

    /// Waits until `count` events matching `pred` were emitted.
    pub async fn wait_for_count(&self, pred: impl Fn(&ShellEvent) -> bool, count: usize) {
        tokio::time::timeout(WAIT_LIMIT, async {
            loop {
                let notified = self.notify.notified();
                if self.all().iter().filter(|e| pred(e)).count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("event was not emitted in time");
    }
}

impl ShellEvents for RecordingEvents {
    fn emit(&self, event: ShellEvent) {
        self.events.lock().unwrap().push(event);
        self.notify.notify_waiters();
    }
}

// =============================================================================
// Launcher
// =============================================================================

#[derive(Clone, Copy)]
enum ChildScript {
    /// Runs until killed.
    Running,
    /// Exits right away with the code.
    Crashing(i32),
}

/// Launcher whose children follow a script instead of running programs.
pub struct ScriptedLauncher {
    script: ChildScript,
    /// Role-specific scripts that win over `script`.
    overrides: Vec<(ServiceRole, ChildScript)>,
    launched: Arc<Mutex<Vec<LaunchSpec>>>,
    kills: Arc<AtomicUsize>,
}

impl ScriptedLauncher {
    fn with_script(script: ChildScript) -> Self {
        ScriptedLauncher {
            script,
            overrides: Vec::new(),
            launched: Arc::default(),
            kills: Arc::default(),
        }
    }

    pub fn running() -> Self {
        Self::with_script(ChildScript::Running)
    }

    pub fn crashing(code: i32) -> Self {
        Self::with_script(ChildScript::Crashing(code))
    }

    /// Children of `role` exit right away; every other role keeps running.
    pub fn crashing_role(role: ServiceRole, code: i32) -> Self {
        let mut launcher = Self::running();
        launcher.overrides.push((role, ChildScript::Crashing(code)));
        launcher
    }

    fn script_for(&self, role: ServiceRole) -> ChildScript {
        self.overrides
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, script)| *script)
            .unwrap_or(self.script)
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn launches_of(&self, role: ServiceRole) -> usize {
        self.launched_roles().into_iter().filter(|r| *r == role).count()
    }

    pub fn launched_roles(&self) -> Vec<ServiceRole> {
        self.launched.lock().unwrap().iter().map(|s| s.role).collect()
    }

    /// Every plan handed to the launcher, in order.
    pub fn launched_specs(&self) -> Vec<LaunchSpec> {
        self.launched.lock().unwrap().clone()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

struct ScriptedChild {
    pid: u32,
    script: ChildScript,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ManagedChild for ScriptedChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> SupervisorResult<Option<i32>> {
        match self.script {
            ChildScript::Running => std::future::pending().await,
            ChildScript::Crashing(code) => Ok(Some(code)),
        }
    }

    async fn kill(&mut self) -> SupervisorResult<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ManagedChild>> {
        let pid = {
            let mut launched = self.launched.lock().unwrap();
            launched.push(spec.clone());
            1000 + launched.len() as u32
        };
        Ok(Box::new(ScriptedChild {
            pid,
            script: self.script_for(spec.role),
            kills: self.kills.clone(),
        }))
    }
}

// =============================================================================
// Restarter
// =============================================================================

#[derive(Default)]
pub struct CountingRestarter {
    calls: AtomicUsize,
}

impl CountingRestarter {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRestarter for CountingRestarter {
    async fn restart_services(&self) -> SupervisorResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Print Host
// =============================================================================

/// One call made against a fake surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Open { visible: bool },
    Load(String),
    Assets,
    ShowInactive,
    Measure,
    Capture { width: u32, height: u32 },
    Print(PrintOptions),
    Dialog,
    Close,
}

/// Print host that records calls and answers from fixed values.
#[derive(Default)]
pub struct FakePrintHost {
    printers: Option<Vec<HostPrinter>>,
    size_px: Option<(f64, f64)>,
    print_error: Option<String>,
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
}

impl FakePrintHost {
    pub fn measuring(width: f64, height: f64) -> Self {
        FakePrintHost {
            printers: Some(Vec::new()),
            size_px: Some((width, height)),
            ..Default::default()
        }
    }

    pub fn unmeasurable() -> Self {
        FakePrintHost {
            printers: Some(Vec::new()),
            ..Default::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        FakePrintHost {
            print_error: Some(reason.to_string()),
            ..Self::measuring(300.0, 1000.0)
        }
    }

    pub fn with_printers(printers: Vec<HostPrinter>) -> Self {
        FakePrintHost {
            printers: Some(printers),
            ..Default::default()
        }
    }

    /// Host whose printer query fails.
    pub fn broken() -> Self {
        FakePrintHost::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_options(&self) -> Option<PrintOptions> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SurfaceCall::Print(options) => Some(options),
            _ => None,
        })
    }
}

struct FakeSurface {
    size_px: Option<(f64, f64)>,
    print_error: Option<String>,
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
}

impl FakeSurface {
    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PrintSurface for FakeSurface {
    async fn load_html(&mut self, html: &str) -> SupervisorResult<()> {
        self.record(SurfaceCall::Load(html.to_string()));
        Ok(())
    }

    async fn wait_for_assets(&mut self) -> SupervisorResult<()> {
        self.record(SurfaceCall::Assets);
        Ok(())
    }

    async fn show_inactive(&mut self) -> SupervisorResult<()> {
        self.record(SurfaceCall::ShowInactive);
        Ok(())
    }

    async fn measure_px(&mut self) -> SupervisorResult<(f64, f64)> {
        self.record(SurfaceCall::Measure);
        self.size_px
            .ok_or_else(|| SupervisorError::SurfaceFailed("no layout".into()))
    }

    async fn capture_png(&mut self, width: u32, height: u32) -> SupervisorResult<String> {
        self.record(SurfaceCall::Capture { width, height });
        Ok("data:image/png;base64,iVBORw0KGgo=".into())
    }

    async fn print(&mut self, options: &PrintOptions) -> SupervisorResult<()> {
        self.record(SurfaceCall::Print(options.clone()));
        match &self.print_error {
            Some(reason) => Err(SupervisorError::PrintFailed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn print_dialog(&mut self) -> SupervisorResult<()> {
        self.record(SurfaceCall::Dialog);
        Ok(())
    }

    async fn close(&mut self) {
        self.record(SurfaceCall::Close);
    }
}

#[async_trait]
impl PrintHost for FakePrintHost {
    async fn list_printers(&self) -> SupervisorResult<Vec<HostPrinter>> {
        self.printers
            .clone()
            .ok_or_else(|| SupervisorError::SurfaceFailed("printer query failed".into()))
    }

    async fn open_surface(&self, visible: bool) -> SupervisorResult<Box<dyn PrintSurface>> {
        self.calls.lock().unwrap().push(SurfaceCall::Open { visible });
        Ok(Box::new(FakeSurface {
            size_px: self.size_px,
            print_error: self.print_error.clone(),
            calls: self.calls.clone(),
        }))
    }
}
