//! Auto-click plugin
//!
//! While enabled, holding the mouse side button X2 clicks the left button
//! repeatedly and holding X1 clicks the right button, at a configurable
//! interval. The button state is written by the input listener and read by
//! two independent click loops through single-writer atomic flags.
//!
//! Capabilities: `start`, `stop`, `setInterval` (`{"interval": seconds}`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sdk::capability::{Capability, CapabilityProvider, PluginDescriptor, PluginSection};
use sdk::errors::EngineError;
use sdk::types::{CapabilityArgs, CapabilityOutput};
use serde_json::json;
use tracing::{debug, info, warn};

/// Interval used when the section has none
pub const DEFAULT_INTERVAL_SECS: f64 = 0.003;

/// Longest interval `setInterval` accepts
pub const MAX_INTERVAL_SECS: f64 = 60.0;

/// Mouse buttons the plugin reads or drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    X1,
    X2,
}

/// Synthesizes clicks
pub trait PointerDriver: Send + Sync {
    fn click(&self, button: PointerButton) -> Result<(), EngineError>;
}

/// Callback receiving `(button, pressed)` from the input listener
pub type ButtonCallback = Box<dyn Fn(PointerButton, bool) + Send + Sync>;

/// Global mouse button listener
pub trait InputSource: Send + Sync {
    /// Start delivering button events to `callback`, replacing any previous one
    fn subscribe(&self, callback: ButtonCallback) -> Result<(), EngineError>;

    /// Stop delivering events
    fn unsubscribe(&self);
}

/// Driver that only logs, for headless runs
#[derive(Debug, Default)]
pub struct LoggingPointer;

impl PointerDriver for LoggingPointer {
    fn click(&self, button: PointerButton) -> Result<(), EngineError> {
        tracing::trace!("click {:?}", button);
        Ok(())
    }
}

/// Input source that never reports a button, for headless runs
#[derive(Debug, Default)]
pub struct NoInput;

impl InputSource for NoInput {
    fn subscribe(&self, _callback: ButtonCallback) -> Result<(), EngineError> {
        debug!("No input listener available, side buttons are ignored");
        Ok(())
    }

    fn unsubscribe(&self) {}
}

/// State shared by the listener callback, the click loops and the capabilities
#[derive(Debug)]
struct ClickState {
    left: AtomicBool,
    right: AtomicBool,
    /// Bumped on every start/stop; a loop exits once it no longer matches
    generation: AtomicU64,
    running: AtomicBool,
    interval_micros: AtomicU64,
}

impl ClickState {
    fn new(interval_secs: f64) -> Self {
        Self {
            left: AtomicBool::new(false),
            right: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            interval_micros: AtomicU64::new(secs_to_micros(interval_secs)),
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_micros.load(Ordering::Relaxed))
    }

    fn on_button(&self, button: PointerButton, pressed: bool) {
        match button {
            PointerButton::X1 => {
                self.right.store(pressed, Ordering::Relaxed);
                info!("Right auto-click {}", if pressed { "on" } else { "off" });
            }
            PointerButton::X2 => {
                self.left.store(pressed, Ordering::Relaxed);
                info!("Left auto-click {}", if pressed { "on" } else { "off" });
            }
            _ => {}
        }
    }
}

fn valid_interval(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0 && secs <= MAX_INTERVAL_SECS
}

/// Only called with intervals that passed [`valid_interval`]
fn secs_to_micros(secs: f64) -> u64 {
    (secs * 1_000_000.0).round().max(1.0) as u64
}

/// Auto-click capability provider
pub struct AutoclickPlugin {
    pointer: Arc<dyn PointerDriver>,
    input: Arc<dyn InputSource>,
}

impl AutoclickPlugin {
    pub fn new(pointer: Arc<dyn PointerDriver>, input: Arc<dyn InputSource>) -> Self {
        Self { pointer, input }
    }
}

impl CapabilityProvider for AutoclickPlugin {
    fn name(&self) -> &str {
        "autoclick"
    }

    fn init(&mut self, section: PluginSection) -> Result<PluginDescriptor, EngineError> {
        if !section.is_present() {
            info!("No [plugins.autoclick] section, using defaults");
        }
        let mut defaults = serde_json::Map::new();
        defaults.insert("interval".to_string(), json!(DEFAULT_INTERVAL_SECS));
        section.merge_defaults(defaults);

        let interval = match section.get_f64("interval") {
            Some(v) if valid_interval(v) => v,
            other => {
                warn!(
                    "Invalid autoclick interval {:?}, using {}",
                    other, DEFAULT_INTERVAL_SECS
                );
                section.set("interval", json!(DEFAULT_INTERVAL_SECS));
                DEFAULT_INTERVAL_SECS
            }
        };

        let state = Arc::new(ClickState::new(interval));

        let start = {
            let state = Arc::clone(&state);
            let pointer = Arc::clone(&self.pointer);
            let input = Arc::clone(&self.input);
            Capability::new("start", move |_| {
                start_clicking(&state, &pointer, input.as_ref())
            })
        };

        let stop = {
            let state = Arc::clone(&state);
            let input = Arc::clone(&self.input);
            Capability::new("stop", move |_| stop_clicking(&state, input.as_ref()))
        };

        let set_interval = {
            let state = Arc::clone(&state);
            let section = section.clone();
            Capability::new("setInterval", move |args| {
                update_interval(&state, &section, &args)
            })
        };

        Ok(PluginDescriptor::new(self.name())
            .with_capability(start)
            .with_capability(stop)
            .with_capability(set_interval))
    }
}

fn start_clicking(
    state: &Arc<ClickState>,
    pointer: &Arc<dyn PointerDriver>,
    input: &dyn InputSource,
) -> Result<CapabilityOutput, EngineError> {
    if state.running.swap(true, Ordering::SeqCst) {
        debug!("Auto-click already running");
        return Ok(CapabilityOutput::json(json!({ "running": true })));
    }
    let generation = state.generation.fetch_add(1, Ordering::SeqCst) + 1;

    for (button, target) in [(PointerButton::Left, true), (PointerButton::Right, false)] {
        let loop_state = Arc::clone(state);
        let pointer = Arc::clone(pointer);
        let spawned = thread::Builder::new()
            .name(format!("autoclick-{:?}", button).to_lowercase())
            .spawn(move || click_loop(&loop_state, pointer.as_ref(), button, target, generation));
        if let Err(e) = spawned {
            abandon_start(state);
            return Err(EngineError::failed("start", format!("cannot spawn click loop: {}", e)));
        }
    }

    let listener_state = Arc::clone(state);
    if let Err(e) = input.subscribe(Box::new(move |button, pressed| {
        listener_state.on_button(button, pressed)
    })) {
        abandon_start(state);
        return Err(EngineError::failed("start", e.to_string()));
    }

    info!("Auto-click started, interval {:?}", state.interval());
    Ok(CapabilityOutput::json(json!({ "running": true })))
}

/// Undo a half-finished start: loops already spawned exit, later starts work
fn abandon_start(state: &ClickState) {
    state.generation.fetch_add(1, Ordering::SeqCst);
    state.running.store(false, Ordering::SeqCst);
}

fn click_loop(
    state: &ClickState,
    pointer: &dyn PointerDriver,
    button: PointerButton,
    left_flag: bool,
    generation: u64,
) {
    while state.generation.load(Ordering::SeqCst) == generation {
        let held = if left_flag {
            state.left.load(Ordering::Relaxed)
        } else {
            state.right.load(Ordering::Relaxed)
        };
        if held {
            if let Err(e) = pointer.click(button) {
                warn!("Click failed: {}", e);
            }
        }
        thread::sleep(state.interval());
    }
    debug!("Auto-click loop {:?} exited", button);
}

fn stop_clicking(state: &ClickState, input: &dyn InputSource) -> Result<CapabilityOutput, EngineError> {
    state.left.store(false, Ordering::Relaxed);
    state.right.store(false, Ordering::Relaxed);
    if state.running.swap(false, Ordering::SeqCst) {
        state.generation.fetch_add(1, Ordering::SeqCst);
        input.unsubscribe();
        info!("Auto-click stopped");
    }
    Ok(CapabilityOutput::json(json!({ "running": false })))
}

fn update_interval(
    state: &ClickState,
    section: &PluginSection,
    args: &CapabilityArgs,
) -> Result<CapabilityOutput, EngineError> {
    let interval = match args.param_f64("interval") {
        Ok(v) => v,
        Err(e) => args.scalar().and_then(|v| v.as_f64()).ok_or(e)?,
    };
    if !valid_interval(interval) {
        return Err(EngineError::invalid_args(
            "setInterval",
            format!(
                "'interval' must be a positive number of seconds, at most {}",
                MAX_INTERVAL_SECS
            ),
        ));
    }

    state
        .interval_micros
        .store(secs_to_micros(interval), Ordering::Relaxed);
    section.set("interval", json!(interval));
    info!("Auto-click interval set to {}s", interval);

    Ok(CapabilityOutput::json(json!({ "interval": interval })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingPointer {
        left: AtomicUsize,
        right: AtomicUsize,
    }

    impl PointerDriver for CountingPointer {
        fn click(&self, button: PointerButton) -> Result<(), EngineError> {
            match button {
                PointerButton::Left => self.left.fetch_add(1, Ordering::SeqCst),
                PointerButton::Right => self.right.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
            Ok(())
        }
    }

    #[derive(Default)]
    struct ManualInput {
        callback: Mutex<Option<ButtonCallback>>,
    }

    impl ManualInput {
        fn press(&self, button: PointerButton, pressed: bool) {
            if let Some(cb) = self.callback.lock().unwrap().as_ref() {
                cb(button, pressed);
            }
        }
    }

    impl InputSource for ManualInput {
        fn subscribe(&self, callback: ButtonCallback) -> Result<(), EngineError> {
            *self.callback.lock().unwrap() = Some(callback);
            Ok(())
        }

        fn unsubscribe(&self) {
            *self.callback.lock().unwrap() = None;
        }
    }

    fn find<'a>(descriptor: &'a PluginDescriptor, name: &str) -> &'a Capability {
        descriptor
            .capabilities
            .iter()
            .find(|c| c.name() == name)
            .unwrap()
    }

    #[test]
    fn test_first_run_persists_default_interval() {
        let section = PluginSection::missing("autoclick");
        let mut plugin = AutoclickPlugin::new(Arc::new(LoggingPointer), Arc::new(NoInput));
        let descriptor = plugin.init(section.clone()).unwrap();

        let names: Vec<&str> = descriptor.capabilities.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["start", "stop", "setInterval"]);
        assert!(descriptor.description.is_none());

        assert!(section.is_dirty());
        assert_eq!(section.get_f64("interval"), Some(DEFAULT_INTERVAL_SECS));
    }

    #[test]
    fn test_existing_interval_is_kept() {
        let mut values = serde_json::Map::new();
        values.insert("interval".to_string(), json!(0.05));
        let section = PluginSection::existing("autoclick", values);

        let mut plugin = AutoclickPlugin::new(Arc::new(LoggingPointer), Arc::new(NoInput));
        plugin.init(section.clone()).unwrap();

        assert!(!section.is_dirty());
        assert_eq!(section.get_f64("interval"), Some(0.05));
    }

    #[test]
    fn test_set_interval_updates_section() {
        let section = PluginSection::missing("autoclick");
        let mut plugin = AutoclickPlugin::new(Arc::new(LoggingPointer), Arc::new(NoInput));
        let descriptor = plugin.init(section.clone()).unwrap();
        let set = find(&descriptor, "setInterval");

        set.invoke(CapabilityArgs::empty("setInterval").with_param("interval", json!(0.01)))
            .unwrap();
        assert_eq!(section.get_f64("interval"), Some(0.01));

        // Bare number instead of an object
        set.invoke(CapabilityArgs::new("setInterval", json!(0.2)))
            .unwrap();
        assert_eq!(section.get_f64("interval"), Some(0.2));

        for bad in [json!(-1), json!(0), json!(1e300)] {
            let err = set
                .invoke(CapabilityArgs::empty("setInterval").with_param("interval", bad))
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidArguments { .. }));
        }
        assert_eq!(section.get_f64("interval"), Some(0.2));
    }

    #[test]
    fn test_oversized_persisted_interval_falls_back() {
        let mut values = serde_json::Map::new();
        values.insert("interval".to_string(), json!(1e30));
        let section = PluginSection::existing("autoclick", values);

        let mut plugin = AutoclickPlugin::new(Arc::new(LoggingPointer), Arc::new(NoInput));
        plugin.init(section.clone()).unwrap();
        assert_eq!(section.get_f64("interval"), Some(DEFAULT_INTERVAL_SECS));
    }

    /// Refuses the first subscription, accepts later ones
    #[derive(Default)]
    struct FlakyInput {
        attempts: AtomicUsize,
    }

    impl InputSource for FlakyInput {
        fn subscribe(&self, _callback: ButtonCallback) -> Result<(), EngineError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(EngineError::Plugin("input hook unavailable".to_string()));
            }
            Ok(())
        }

        fn unsubscribe(&self) {}
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let input = Arc::new(FlakyInput::default());
        let mut plugin = AutoclickPlugin::new(
            Arc::new(LoggingPointer),
            Arc::clone(&input) as Arc<dyn InputSource>,
        );
        let descriptor = plugin.init(PluginSection::missing("autoclick")).unwrap();
        let start = find(&descriptor, "start");

        let err = start.invoke(CapabilityArgs::empty("start")).unwrap_err();
        assert!(matches!(err, EngineError::CapabilityFailed { .. }));

        let out = start.invoke(CapabilityArgs::empty("start")).unwrap();
        assert_eq!(out.data["running"], true);
        assert_eq!(input.attempts.load(Ordering::SeqCst), 2);

        find(&descriptor, "stop")
            .invoke(CapabilityArgs::empty("stop"))
            .unwrap();
    }

    #[test]
    fn test_side_buttons_drive_click_loops() {
        let pointer = Arc::new(CountingPointer::default());
        let input = Arc::new(ManualInput::default());
        let mut values = serde_json::Map::new();
        values.insert("interval".to_string(), json!(0.001));

        let mut plugin = AutoclickPlugin::new(
            Arc::clone(&pointer) as Arc<dyn PointerDriver>,
            Arc::clone(&input) as Arc<dyn InputSource>,
        );
        let descriptor = plugin
            .init(PluginSection::existing("autoclick", values))
            .unwrap();

        find(&descriptor, "start")
            .invoke(CapabilityArgs::empty("start"))
            .unwrap();

        input.press(PointerButton::X2, true);
        thread::sleep(Duration::from_millis(50));
        input.press(PointerButton::X2, false);

        assert!(pointer.left.load(Ordering::SeqCst) > 0);
        assert_eq!(pointer.right.load(Ordering::SeqCst), 0);

        input.press(PointerButton::X1, true);
        thread::sleep(Duration::from_millis(50));
        assert!(pointer.right.load(Ordering::SeqCst) > 0);

        find(&descriptor, "stop")
            .invoke(CapabilityArgs::empty("stop"))
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        let settled = pointer.right.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(pointer.right.load(Ordering::SeqCst), settled);

        // Listener detached: presses after stop do nothing
        input.press(PointerButton::X2, true);
        assert!(input.callback.lock().unwrap().is_none());
    }
}
