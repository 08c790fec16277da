//! Presentation thread
//!
//! One dedicated thread owns everything that must not be touched from
//! workers: the status surface, the crosshair overlay, and the executor side
//! of the action marshal. [`PresentationLoop`] serves marshalled actions and
//! status transitions one at a time, each channel in arrival order, until
//! every producer handle has been dropped.

use std::io::Write;
use std::thread;

use tracing::{debug, error, info};

use sdk::errors::EngineError;

use crate::marshal::MarshalExecutor;
use crate::plugins::CrosshairStyle;
use crate::status::{StatusConsumer, StatusSurface, StatusView, SurfaceGeometry};

/// Presentation collaborator that draws the crosshair overlay
pub trait OverlaySurface: Send {
    /// Show the crosshair, or redraw it with a new style
    fn show_crosshair(&mut self, style: &CrosshairStyle);

    fn hide_crosshair(&mut self);
}

/// Nominal screen height reported by the console surface
const CONSOLE_SCREEN_HEIGHT: i32 = 1080;

/// Surface padding above and below the label, matching the desktop layout
const CONSOLE_SURFACE_PADDING: i32 = 100;

/// Height of one label line
const CONSOLE_LINE_HEIGHT: i32 = 45;

/// Status surface that writes phase changes to stderr
pub struct ConsoleSurface {
    visible: bool,
    out: Box<dyn Write + Send>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            visible: false,
            out,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Default for ConsoleSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSurface for ConsoleSurface {
    fn geometry(&self, label: &str) -> SurfaceGeometry {
        let lines = label.lines().count().max(1) as i32;
        SurfaceGeometry {
            screen_height: CONSOLE_SCREEN_HEIGHT,
            surface_height: CONSOLE_SURFACE_PADDING + lines * CONSOLE_LINE_HEIGHT,
        }
    }

    fn show(&mut self, view: &StatusView) {
        self.visible = true;
        let _ = writeln!(self.out, "[{}]", view.label);
        let _ = self.out.flush();
    }

    fn hide(&mut self) {
        if self.visible {
            self.visible = false;
            debug!("Status surface hidden");
        }
    }
}

/// Overlay that only records what it would draw
#[derive(Debug, Default)]
pub struct ConsoleOverlay {
    current: Option<CrosshairStyle>,
}

impl ConsoleOverlay {
    pub fn current(&self) -> Option<&CrosshairStyle> {
        self.current.as_ref()
    }
}

impl OverlaySurface for ConsoleOverlay {
    fn show_crosshair(&mut self, style: &CrosshairStyle) {
        info!(
            color = %style.color,
            size = style.size,
            line_width = style.line_width,
            "Crosshair shown"
        );
        self.current = Some(style.clone());
    }

    fn hide_crosshair(&mut self) {
        if self.current.take().is_some() {
            info!("Crosshair hidden");
        }
    }
}

/// Owner of the presentation-side state
pub struct PresentationLoop {
    executor: MarshalExecutor,
    status: StatusConsumer,
    surface: Box<dyn StatusSurface + Send>,
}

/// Join handle of a spawned presentation thread
pub struct PresentationHandle {
    thread: thread::JoinHandle<()>,
}

impl PresentationHandle {
    /// Wait for the loop to drain and exit
    pub fn join(self) -> Result<(), EngineError> {
        self.thread
            .join()
            .map_err(|_| EngineError::Plugin("presentation thread panicked".to_string()))
    }
}

impl PresentationLoop {
    pub fn new(
        executor: MarshalExecutor,
        status: StatusConsumer,
        surface: Box<dyn StatusSurface + Send>,
    ) -> Self {
        Self {
            executor,
            status,
            surface,
        }
    }

    /// Run the loop on a new thread with its own single-threaded runtime
    pub fn spawn(self) -> Result<PresentationHandle, EngineError> {
        let thread = thread::Builder::new()
            .name("presentation".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Cannot start presentation runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(self.run());
            })?;
        Ok(PresentationHandle { thread })
    }

    /// Serve until every marshal and status handle is gone
    pub async fn run(self) {
        let Self {
            mut executor,
            mut status,
            mut surface,
        } = self;
        let mut marshal_open = true;
        let mut status_open = true;

        info!("Presentation loop started");
        while marshal_open || status_open {
            tokio::select! {
                command = status.recv(), if status_open => match command {
                    Some(command) => {
                        status.apply_and_publish(command, surface.as_mut()).await;
                    }
                    None => status_open = false,
                },
                result = executor.run_next(), if marshal_open => match result {
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!("Marshalled action failed: {}", e),
                    None => marshal_open = false,
                },
            }
        }
        info!("Presentation loop stopped");
    }
}
