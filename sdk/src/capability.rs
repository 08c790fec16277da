//! Capability provider trait and descriptor types
//!
//! This module defines the `CapabilityProvider` trait that every plugin must
//! implement, the `Capability` a plugin exposes to the model, and the
//! `PluginSection` handle through which a plugin reads and persists its own
//! configuration subsection.

use crate::errors::EngineError;
use crate::types::{CapabilityArgs, CapabilityOutput};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Signature of a capability body
pub type CapabilityFn =
    dyn Fn(CapabilityArgs) -> Result<CapabilityOutput, EngineError> + Send + Sync + 'static;

/// Where a capability is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionAffinity {
    /// Runs directly on the thread that dispatched it
    Worker,

    /// Touches presentation-owned or OS-exclusive state and must be handed to
    /// the presentation thread through the action marshal
    Presentation,
}

impl fmt::Display for ExecutionAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionAffinity::Worker => write!(f, "worker"),
            ExecutionAffinity::Presentation => write!(f, "presentation"),
        }
    }
}

/// A named, invocable operation exposed by a plugin
#[derive(Clone)]
pub struct Capability {
    name: String,
    affinity: ExecutionAffinity,
    handler: Arc<CapabilityFn>,
}

impl Capability {
    /// Create a capability that runs on the dispatching thread
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CapabilityArgs) -> Result<CapabilityOutput, EngineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            affinity: ExecutionAffinity::Worker,
            handler: Arc::new(handler),
        }
    }

    /// Mark the capability as presentation-exclusive
    pub fn on_presentation(mut self) -> Self {
        self.affinity = ExecutionAffinity::Presentation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn affinity(&self) -> ExecutionAffinity {
        self.affinity
    }

    /// Run the capability body on the current thread
    pub fn invoke(&self, args: CapabilityArgs) -> Result<CapabilityOutput, EngineError> {
        (self.handler)(args)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("affinity", &self.affinity)
            .finish()
    }
}

/// What a plugin hands back from `init`
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Plugin name, used in logs and duplicate reports
    pub name: String,

    /// Ordered capabilities; may be empty for informational plugins
    pub capabilities: Vec<Capability>,

    /// Text enumerating usable targets, injected into the system prompt
    pub description: Option<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            description: None,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Trait that all capability plugins must implement
///
/// `init` is called exactly once at startup. The plugin may read its section,
/// write defaults into it (they are persisted after the registry is built) and
/// keep the handle to update it later.
pub trait CapabilityProvider: Send {
    /// Name of the plugin and of its configuration subsection
    fn name(&self) -> &str;

    /// Initialize the plugin and describe what it offers
    fn init(&mut self, section: PluginSection) -> Result<PluginDescriptor, EngineError>;
}

#[derive(Debug, Default)]
struct SectionState {
    present: bool,
    values: serde_json::Map<String, serde_json::Value>,
    dirty: bool,
}

/// Shared handle to one plugin's configuration subsection
///
/// Clones share the same underlying map, so a plugin can keep a copy inside its
/// capability closures and the engine can still read the final state back when
/// it persists the configuration.
#[derive(Debug, Clone)]
pub struct PluginSection {
    name: String,
    state: Arc<RwLock<SectionState>>,
}

impl PluginSection {
    /// Section that exists in the loaded configuration
    pub fn existing(
        name: impl Into<String>,
        values: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(SectionState {
                present: true,
                values,
                dirty: false,
            })),
        }
    }

    /// Section missing from the configuration (first run)
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(SectionState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the section was present when the configuration was loaded
    pub fn is_present(&self) -> bool {
        self.read(|s| s.present)
    }

    /// Whether the plugin changed the section since load
    pub fn is_dirty(&self) -> bool {
        self.read(|s| s.dirty)
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.read(|s| s.values.get(key).cloned())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    /// Set one value and mark the section dirty
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.write(|s| {
            s.values.insert(key.into(), value);
            s.present = true;
            s.dirty = true;
        });
    }

    /// Fill in every default the section does not already have.
    ///
    /// Existing values win. The section is marked dirty only if something was
    /// actually added.
    pub fn merge_defaults(&self, defaults: serde_json::Map<String, serde_json::Value>) {
        self.write(|s| {
            for (key, value) in defaults {
                if !s.values.contains_key(&key) {
                    s.values.insert(key, value);
                    s.dirty = true;
                }
            }
            s.present = true;
        });
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> serde_json::Map<String, serde_json::Value> {
        self.read(|s| s.values.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&SectionState) -> T) -> T {
        match self.state.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write(&self, f: impl FnOnce(&mut SectionState)) {
        match self.state.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_capability_invoke() {
        let cap = Capability::new("echo", |args| Ok(CapabilityOutput::json(args.value)));
        assert_eq!(cap.name(), "echo");
        assert_eq!(cap.affinity(), ExecutionAffinity::Worker);

        let out = cap.invoke(CapabilityArgs::new("echo", json!({"a": 1}))).unwrap();
        assert_eq!(out.data, json!({"a": 1}));
    }

    #[test]
    fn test_on_presentation() {
        let cap = Capability::new("draw", |_| Ok(CapabilityOutput::empty())).on_presentation();
        assert_eq!(cap.affinity(), ExecutionAffinity::Presentation);
    }

    #[test]
    fn test_missing_section_defaults_mark_dirty() {
        let section = PluginSection::missing("autoclick");
        assert!(!section.is_present());

        let mut defaults = serde_json::Map::new();
        defaults.insert("interval".into(), json!(0.003));
        section.merge_defaults(defaults);

        assert!(section.is_present());
        assert!(section.is_dirty());
        assert_eq!(section.get_f64("interval"), Some(0.003));
    }

    #[test]
    fn test_existing_values_win_over_defaults() {
        let mut values = serde_json::Map::new();
        values.insert("size".into(), json!(40));
        let section = PluginSection::existing("crosshair", values);

        let mut defaults = serde_json::Map::new();
        defaults.insert("size".into(), json!(20));
        section.merge_defaults(defaults.clone());
        assert!(!section.is_dirty());
        assert_eq!(section.get_i64("size"), Some(40));

        defaults.insert("color".into(), json!("#FF0000"));
        section.merge_defaults(defaults);
        assert!(section.is_dirty());
        assert_eq!(section.get_string("color"), Some("#FF0000".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let section = PluginSection::missing("autoclick");
        let held_by_plugin = section.clone();
        held_by_plugin.set("interval", json!(0.5));
        assert_eq!(section.get_f64("interval"), Some(0.5));
        assert!(section.is_dirty());
    }
}
