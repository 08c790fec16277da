//! Built-in capability providers
//!
//! Each plugin reaches the operating system only through a small driver
//! trait, so the binary can wire headless drivers and tests can record what
//! would have happened.

pub mod autoclick;
pub mod crosshair;
pub mod launcher;

pub use autoclick::AutoclickPlugin;
pub use crosshair::{CrosshairPlugin, CrosshairStyle, SharedOverlay};
pub use launcher::LauncherPlugin;

use std::path::PathBuf;
use std::sync::Arc;

use sdk::capability::CapabilityProvider;

use autoclick::{InputSource, LoggingPointer, NoInput, PointerDriver};
use launcher::{default_desktop_dirs, ProgramLauncher, SystemLauncher};

/// OS collaborators the built-in plugins drive
#[derive(Clone)]
pub struct PluginDrivers {
    pub pointer: Arc<dyn PointerDriver>,
    pub input: Arc<dyn InputSource>,
    pub launcher: Arc<dyn ProgramLauncher>,
    /// Directories searched for program shortcuts
    pub desktop_dirs: Vec<PathBuf>,
    pub overlay: SharedOverlay,
}

impl PluginDrivers {
    /// Logging pointer, no input listener, the system opener and the user's
    /// desktops for programs
    pub fn headless(overlay: SharedOverlay) -> Self {
        Self {
            pointer: Arc::new(LoggingPointer),
            input: Arc::new(NoInput),
            launcher: Arc::new(SystemLauncher),
            desktop_dirs: default_desktop_dirs(),
            overlay,
        }
    }
}

/// Built-in providers in registration order
pub fn builtin_providers(drivers: &PluginDrivers) -> Vec<Box<dyn CapabilityProvider>> {
    vec![
        Box::new(AutoclickPlugin::new(
            Arc::clone(&drivers.pointer),
            Arc::clone(&drivers.input),
        )),
        Box::new(LauncherPlugin::with_dirs(
            drivers.desktop_dirs.clone(),
            Arc::clone(&drivers.launcher),
        )),
        Box::new(CrosshairPlugin::new(Arc::clone(&drivers.overlay))),
    ]
}
