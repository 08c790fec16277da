//! Program launcher plugin
//!
//! Scans the user and public desktops for shortcut files once at startup,
//! advertises their names to the model, and launches the first shortcut
//! whose file name contains the requested text.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use sdk::capability::{Capability, CapabilityProvider, PluginDescriptor, PluginSection};
use sdk::errors::EngineError;
use sdk::types::{CapabilityArgs, CapabilityOutput};
use serde_json::json;
use tracing::{debug, info};

/// Shortcut file extensions picked up from the desktops
const SHORTCUT_EXTENSIONS: &[&str] = &["lnk", "url", "desktop"];

/// Heading of the description injected into the system prompt
const DESCRIPTION_HEADING: &str = "可用的程序列表：\n";

/// Opens a shortcut
pub trait ProgramLauncher: Send + Sync {
    fn launch(&self, shortcut: &Path) -> Result<(), EngineError>;
}

/// Hands the shortcut to the platform's default opener
#[derive(Debug, Default)]
pub struct SystemLauncher;

impl ProgramLauncher for SystemLauncher {
    fn launch(&self, shortcut: &Path) -> Result<(), EngineError> {
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", ""]).arg(shortcut);
            c
        } else if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(shortcut);
            c
        } else {
            let mut c = Command::new("xdg-open");
            c.arg(shortcut);
            c
        };

        command
            .spawn()
            .map(|_| ())
            .map_err(|e| EngineError::failed("startProgram", format!("cannot open {:?}: {}", shortcut, e)))
    }
}

/// Desktop directories searched when none are given
pub fn default_desktop_dirs() -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();
    if let Some(desktop) = dirs::desktop_dir() {
        dirs_found.push(desktop);
    } else if let Some(home) = dirs::home_dir() {
        dirs_found.push(home.join("Desktop"));
    }
    if let Some(public) = env::var_os("PUBLIC") {
        dirs_found.push(PathBuf::from(public).join("Desktop"));
    } else if cfg!(target_os = "windows") {
        dirs_found.push(PathBuf::from("C:\\Users\\Public\\Desktop"));
    }
    dirs_found
}

/// Shortcut files in `dirs`, directory by directory, sorted by lower-cased
/// name within each
pub fn scan_shortcuts(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut shortcuts = Vec::new();
    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping desktop {:?}: {}", dir, e);
                continue;
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_shortcut(path))
            .collect();
        found.sort_by_key(|path| match_key(path));
        shortcuts.extend(found);
    }
    shortcuts
}

fn is_shortcut(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SHORTCUT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Lower-cased file name without extension
fn program_name(shortcut: &Path) -> String {
    shortcut
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Lower-cased file name with extension, the text queries are matched against
fn match_key(shortcut: &Path) -> String {
    shortcut
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Program launcher capability provider
pub struct LauncherPlugin {
    dirs: Vec<PathBuf>,
    launcher: Arc<dyn ProgramLauncher>,
}

impl LauncherPlugin {
    pub fn with_dirs(dirs: Vec<PathBuf>, launcher: Arc<dyn ProgramLauncher>) -> Self {
        Self { dirs, launcher }
    }
}

impl CapabilityProvider for LauncherPlugin {
    fn name(&self) -> &str {
        "launcher"
    }

    fn init(&mut self, _section: PluginSection) -> Result<PluginDescriptor, EngineError> {
        let shortcuts = Arc::new(scan_shortcuts(&self.dirs));
        info!("Found {} desktop shortcuts", shortcuts.len());

        let mut description = String::from(DESCRIPTION_HEADING);
        for shortcut in shortcuts.iter() {
            description.push_str(&program_name(shortcut));
            description.push('\n');
        }

        let launcher = Arc::clone(&self.launcher);
        let start_program = Capability::new("startProgram", move |args| {
            launch_matching(&shortcuts, launcher.as_ref(), &args)
        });

        Ok(PluginDescriptor::new(self.name())
            .with_capability(start_program)
            .with_description(description))
    }
}

fn launch_matching(
    shortcuts: &[PathBuf],
    launcher: &dyn ProgramLauncher,
    args: &CapabilityArgs,
) -> Result<CapabilityOutput, EngineError> {
    let query = match args.param_str("query") {
        Ok(q) => q,
        Err(e) => args
            .scalar()
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(e)?,
    };
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Err(EngineError::invalid_args("startProgram", "'query' is empty"));
    }

    match shortcuts.iter().find(|s| match_key(s).contains(&needle)) {
        Some(shortcut) => {
            launcher.launch(shortcut)?;
            let program = program_name(shortcut);
            info!("Started program: {}", program);
            Ok(CapabilityOutput::json(json!({
                "matched": true,
                "program": program,
            })))
        }
        None => {
            info!("No program matches: {}", query);
            Ok(CapabilityOutput::json(json!({
                "matched": false,
                "query": query,
            })))
        }
    }
}
