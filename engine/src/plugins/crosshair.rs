//! Screen crosshair plugin
//!
//! Draws a crosshair in the middle of the screen through the presentation
//! thread's overlay. Every capability touches the overlay, so all of them
//! run on the presentation thread.
//!
//! The style lives in `[plugins.crosshair]` and is persisted: defaults are
//! merged in on first run and every change is written back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use sdk::capability::{Capability, CapabilityProvider, PluginDescriptor, PluginSection};
use sdk::errors::EngineError;
use sdk::types::{CapabilityArgs, CapabilityOutput};

use crate::presentation::OverlaySurface;

/// Keys `updateCrosshair` accepts
const STYLE_KEYS: &[&str] = &["color", "size", "line_width", "visible"];

/// Crosshair appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosshairStyle {
    /// `#RRGGBB`
    pub color: String,
    /// Length of each arm, in pixels
    pub size: u32,
    pub line_width: u32,
    pub visible: bool,
}

impl Default for CrosshairStyle {
    fn default() -> Self {
        Self {
            color: "#FF0000".to_string(),
            size: 20,
            line_width: 2,
            visible: false,
        }
    }
}

impl CrosshairStyle {
    fn from_section(section: &PluginSection) -> Result<Self, EngineError> {
        serde_json::from_value(serde_json::Value::Object(section.snapshot()))
            .map_err(|e| EngineError::Plugin(format!("invalid [plugins.crosshair]: {}", e)))
    }

    fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Overlay handle shared with the presentation thread
pub type SharedOverlay = Arc<Mutex<dyn OverlaySurface>>;

/// Crosshair capability provider
pub struct CrosshairPlugin {
    overlay: SharedOverlay,
}

impl CrosshairPlugin {
    pub fn new(overlay: SharedOverlay) -> Self {
        Self { overlay }
    }
}

impl CapabilityProvider for CrosshairPlugin {
    fn name(&self) -> &str {
        "crosshair"
    }

    fn init(&mut self, section: PluginSection) -> Result<PluginDescriptor, EngineError> {
        if !section.is_present() {
            info!("Using default crosshair configuration");
        }
        section.merge_defaults(CrosshairStyle::default().to_map());
        // Fail early on a hand-edited section that no longer parses
        CrosshairStyle::from_section(&section)?;

        let state = Arc::new(Crosshair {
            overlay: Arc::clone(&self.overlay),
            section,
            on_screen: AtomicBool::new(false),
        });

        let start = {
            let state = Arc::clone(&state);
            Capability::new("startCrosshair", move |_| state.show()).on_presentation()
        };
        let stop = {
            let state = Arc::clone(&state);
            Capability::new("stopCrosshair", move |_| state.hide()).on_presentation()
        };
        let update = {
            let state = Arc::clone(&state);
            Capability::new("updateCrosshair", move |args| state.update(&args)).on_presentation()
        };

        Ok(PluginDescriptor::new(self.name())
            .with_capability(start)
            .with_capability(stop)
            .with_capability(update))
    }
}

struct Crosshair {
    overlay: SharedOverlay,
    section: PluginSection,
    /// Drawn by `startCrosshair` in this run; the persisted `visible` may be stale
    on_screen: AtomicBool,
}

impl Crosshair {
    fn style(&self, capability: &str) -> Result<CrosshairStyle, EngineError> {
        CrosshairStyle::from_section(&self.section)
            .map_err(|e| EngineError::failed(capability, e.to_string()))
    }

    fn with_overlay<T>(
        &self,
        capability: &str,
        f: impl FnOnce(&mut dyn OverlaySurface) -> T,
    ) -> Result<T, EngineError> {
        let mut overlay = self
            .overlay
            .lock()
            .map_err(|_| EngineError::failed(capability, "overlay lock poisoned"))?;
        Ok(f(&mut *overlay))
    }

    fn show(&self) -> Result<CapabilityOutput, EngineError> {
        let mut style = self.style("startCrosshair")?;
        style.visible = true;
        self.with_overlay("startCrosshair", |o| o.show_crosshair(&style))?;
        self.on_screen.store(true, Ordering::SeqCst);
        self.section.set("visible", json!(true));
        info!("Crosshair started");
        Ok(CapabilityOutput::json(json!(style)))
    }

    fn hide(&self) -> Result<CapabilityOutput, EngineError> {
        self.with_overlay("stopCrosshair", |o| o.hide_crosshair())?;
        self.on_screen.store(false, Ordering::SeqCst);
        self.section.set("visible", json!(false));
        info!("Crosshair stopped");
        Ok(CapabilityOutput::json(json!({ "visible": false })))
    }

    /// Partial update: only the keys present in `args` change.
    ///
    /// The overlay is redrawn only when `startCrosshair` put it on screen.
    fn update(&self, args: &CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        let changes = args.as_object().ok_or_else(|| {
            EngineError::invalid_args("updateCrosshair", "expected an object of style fields")
        })?;

        let before = self.style("updateCrosshair")?;
        let mut merged = before.to_map();
        for (key, value) in changes {
            if STYLE_KEYS.contains(&key.as_str()) {
                merged.insert(key.clone(), value.clone());
            } else {
                warn!("Ignoring unknown crosshair key '{}'", key);
            }
        }
        let after: CrosshairStyle = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| EngineError::invalid_args("updateCrosshair", e.to_string()))?;

        for (key, value) in after.to_map() {
            self.section.set(key, value);
        }

        if self.on_screen.load(Ordering::SeqCst) {
            self.with_overlay("updateCrosshair", |o| {
                if after.visible {
                    o.show_crosshair(&after)
                } else {
                    o.hide_crosshair()
                }
            })?;
            self.on_screen.store(after.visible, Ordering::SeqCst);
        }

        info!("Crosshair updated: {}", args.value);
        Ok(CapabilityOutput::json(json!(after)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingOverlay {
        shown: Vec<CrosshairStyle>,
        hidden: usize,
    }

    impl OverlaySurface for RecordingOverlay {
        fn show_crosshair(&mut self, style: &CrosshairStyle) {
            self.shown.push(style.clone());
        }

        fn hide_crosshair(&mut self) {
            self.hidden += 1;
        }
    }

    fn setup(section: PluginSection) -> (Arc<Mutex<RecordingOverlay>>, PluginDescriptor) {
        let overlay = Arc::new(Mutex::new(RecordingOverlay::default()));
        let shared: SharedOverlay = overlay.clone();
        let descriptor = CrosshairPlugin::new(shared).init(section).unwrap();
        (overlay, descriptor)
    }

    fn invoke(descriptor: &PluginDescriptor, name: &str, args: serde_json::Value) -> CapabilityOutput {
        descriptor
            .capabilities
            .iter()
            .find(|c| c.name() == name)
            .unwrap()
            .invoke(CapabilityArgs::new(name, args))
            .unwrap()
    }

    #[test]
    fn test_capabilities_are_presentation_bound() {
        let (_, descriptor) = setup(PluginSection::missing("crosshair"));
        let names: Vec<&str> = descriptor.capabilities.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["startCrosshair", "stopCrosshair", "updateCrosshair"]);
        assert!(descriptor
            .capabilities
            .iter()
            .all(|c| c.affinity() == sdk::ExecutionAffinity::Presentation));
        assert!(descriptor.description.is_none());
    }

    #[test]
    fn test_defaults_merged_with_existing_section() {
        let mut values = serde_json::Map::new();
        values.insert("color".to_string(), json!("#00FF00"));
        let section = PluginSection::existing("crosshair", values);
        setup(section.clone());

        assert_eq!(section.get_string("color").as_deref(), Some("#00FF00"));
        assert_eq!(section.get_i64("size"), Some(20));
        assert_eq!(section.get_i64("line_width"), Some(2));
        assert_eq!(section.get_bool("visible"), Some(false));
        assert!(section.is_dirty());
    }

    #[test]
    fn test_start_stop_persist_visibility() {
        let section = PluginSection::missing("crosshair");
        let (overlay, descriptor) = setup(section.clone());

        invoke(&descriptor, "startCrosshair", serde_json::Value::Null);
        assert_eq!(section.get_bool("visible"), Some(true));
        assert_eq!(overlay.lock().unwrap().shown.len(), 1);

        invoke(&descriptor, "stopCrosshair", serde_json::Value::Null);
        assert_eq!(section.get_bool("visible"), Some(false));
        assert_eq!(overlay.lock().unwrap().hidden, 1);
    }

    #[test]
    fn test_partial_update_redraws_visible_crosshair() {
        let section = PluginSection::missing("crosshair");
        let (overlay, descriptor) = setup(section.clone());

        invoke(&descriptor, "startCrosshair", serde_json::Value::Null);
        let out = invoke(&descriptor, "updateCrosshair", json!({"size": 30, "bogus": 1}));

        assert_eq!(out.data["size"], 30);
        assert_eq!(out.data["color"], "#FF0000");
        assert_eq!(section.get_i64("size"), Some(30));
        assert!(section.get("bogus").is_none());

        let overlay = overlay.lock().unwrap();
        assert_eq!(overlay.shown.len(), 2);
        assert_eq!(overlay.shown[1].size, 30);
    }

    #[test]
    fn test_update_before_start_leaves_overlay_alone() {
        let mut values = serde_json::Map::new();
        values.insert("visible".to_string(), json!(true));
        let section = PluginSection::existing("crosshair", values);
        let (overlay, descriptor) = setup(section.clone());

        let out = invoke(&descriptor, "updateCrosshair", json!({"color": "#0000FF"}));
        assert_eq!(out.data["color"], "#0000FF");
        assert_eq!(section.get_string("color").as_deref(), Some("#0000FF"));
        {
            let overlay = overlay.lock().unwrap();
            assert!(overlay.shown.is_empty());
            assert_eq!(overlay.hidden, 0);
        }

        // Once started, updates redraw and hiding through an update sticks
        invoke(&descriptor, "startCrosshair", serde_json::Value::Null);
        invoke(&descriptor, "updateCrosshair", json!({"visible": false}));
        invoke(&descriptor, "updateCrosshair", json!({"size": 40}));
        let overlay = overlay.lock().unwrap();
        assert_eq!(overlay.shown.len(), 1);
        assert_eq!(overlay.shown[0].color, "#0000FF");
        assert_eq!(overlay.hidden, 1);
    }

    #[test]
    fn test_update_rejects_bad_values() {
        let (_, descriptor) = setup(PluginSection::missing("crosshair"));
        let update = descriptor
            .capabilities
            .iter()
            .find(|c| c.name() == "updateCrosshair")
            .unwrap();

        let err = update
            .invoke(CapabilityArgs::new("updateCrosshair", json!({"size": "huge"})))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments { .. }));

        let err = update
            .invoke(CapabilityArgs::new("updateCrosshair", json!(5)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArguments { .. }));
    }
}
