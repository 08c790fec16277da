//! Capability registry
//!
//! Aggregates the descriptors returned by every plugin's `init` into one
//! catalog: capability names become unique keys, and the non-empty plugin
//! descriptions are joined in registration order into the text the
//! conversation embeds in the system prompt.
//!
//! The catalog is built once at startup and is read-only afterwards. Two
//! plugins exposing the same capability name is a startup error
//! ([`EngineError::DuplicateCapability`]).
//!
//! # Examples
//!
//! ```
//! use spassit_engine::capabilities::CapabilityRegistry;
//! use sdk::{Capability, CapabilityOutput, PluginDescriptor};
//!
//! let mut registry = CapabilityRegistry::new();
//! registry
//!     .register(
//!         PluginDescriptor::new("autoclick")
//!             .with_capability(Capability::new("start", |_| Ok(CapabilityOutput::empty()))),
//!     )
//!     .unwrap();
//! registry
//!     .register(PluginDescriptor::new("notes").with_description("D"))
//!     .unwrap();
//!
//! let catalog = registry.build();
//! assert!(catalog.get("start").is_some());
//! assert_eq!(catalog.description(), "D");
//! ```

pub mod router;

pub use router::DispatchRouter;

use std::collections::{HashMap, HashSet};

use sdk::capability::{Capability, CapabilityProvider, PluginDescriptor, PluginSection};
use sdk::errors::EngineError;
use tracing::{debug, info};

use crate::config::Config;

/// Separator between plugin descriptions in the aggregated text
const DESCRIPTION_SEPARATOR: &str = "\n";

/// One catalog entry
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub capability: Capability,
    /// Plugin that registered the capability
    pub plugin: String,
}

/// Merged, read-only set of every registered capability
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    order: Vec<String>,
    entries: HashMap<String, CatalogEntry>,
    descriptions: Vec<String>,
}

impl CapabilityCatalog {
    /// Look up a capability by name
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name).map(|e| &e.capability)
    }

    /// Name of the plugin that registered `name`
    pub fn plugin_of(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.plugin.as_str())
    }

    /// Capability names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Non-empty plugin descriptions joined in registration order
    pub fn description(&self) -> String {
        self.descriptions.join(DESCRIPTION_SEPARATOR)
    }
}

/// Builder that merges plugin descriptors into a [`CapabilityCatalog`]
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    catalog: CapabilityCatalog,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one plugin descriptor.
    ///
    /// Fails without changing the registry if any of the plugin's capability
    /// names is already taken, including by the same plugin.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for capability in &descriptor.capabilities {
            if let Some(existing) = self.catalog.entries.get(capability.name()) {
                return Err(EngineError::DuplicateCapability {
                    name: capability.name().to_string(),
                    first: existing.plugin.clone(),
                    second: descriptor.name.clone(),
                });
            }
            if !seen.insert(capability.name()) {
                return Err(EngineError::DuplicateCapability {
                    name: capability.name().to_string(),
                    first: descriptor.name.clone(),
                    second: descriptor.name.clone(),
                });
            }
        }

        debug!(
            "Registering plugin '{}' with {} capabilities",
            descriptor.name,
            descriptor.capabilities.len()
        );

        for capability in descriptor.capabilities {
            let name = capability.name().to_string();
            self.catalog.order.push(name.clone());
            self.catalog.entries.insert(
                name,
                CatalogEntry {
                    capability,
                    plugin: descriptor.name.clone(),
                },
            );
        }

        if let Some(description) = descriptor.description {
            if !description.trim().is_empty() {
                self.catalog.descriptions.push(description);
            }
        }

        Ok(())
    }

    /// Finish building
    pub fn build(self) -> CapabilityCatalog {
        info!(
            "Capability catalog built: {} capabilities",
            self.catalog.len()
        );
        self.catalog
    }
}

/// Initialize every provider against its configuration subsection and build
/// the catalog.
///
/// Returns the catalog and the section handles, so the caller can persist
/// whatever defaults the plugins wrote.
pub fn build_catalog(
    providers: Vec<Box<dyn CapabilityProvider>>,
    config: &Config,
) -> Result<(CapabilityCatalog, Vec<PluginSection>), EngineError> {
    let mut registry = CapabilityRegistry::new();
    let mut sections = Vec::with_capacity(providers.len());

    for mut provider in providers {
        let section = config.plugin_section(provider.name());
        let descriptor = provider.init(section.clone()).map_err(|e| match e {
            EngineError::Plugin(msg) => {
                EngineError::Plugin(format!("{}: {}", provider.name(), msg))
            }
            other => other,
        })?;
        registry.register(descriptor)?;
        sections.push(section);
    }

    Ok((registry.build(), sections))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::CapabilityOutput;

    fn noop(name: &str) -> Capability {
        Capability::new(name, |_| Ok(CapabilityOutput::empty()))
    }

    fn autoclick() -> PluginDescriptor {
        PluginDescriptor::new("autoclick")
            .with_capability(noop("start"))
            .with_capability(noop("stop"))
            .with_capability(noop("setInterval"))
    }

    fn launcher() -> PluginDescriptor {
        PluginDescriptor::new("launcher")
            .with_capability(noop("startProgram"))
            .with_description("可用的程序列表：\nchrome\n")
    }

    #[test]
    fn test_merge_keeps_registration_order() {
        let mut registry = CapabilityRegistry::new();
        registry.register(autoclick()).unwrap();
        registry.register(launcher()).unwrap();
        let catalog = registry.build();

        assert_eq!(
            catalog.names(),
            &["start", "stop", "setInterval", "startProgram"]
        );
        assert_eq!(catalog.plugin_of("setInterval"), Some("autoclick"));
        assert_eq!(catalog.plugin_of("startProgram"), Some("launcher"));
        assert!(catalog.get("unknown").is_none());
    }

    #[test]
    fn test_duplicate_across_plugins_rejected() {
        let mut registry = CapabilityRegistry::new();
        registry.register(autoclick()).unwrap();

        let clash = PluginDescriptor::new("other").with_capability(noop("stop"));
        match registry.register(clash) {
            Err(EngineError::DuplicateCapability {
                name,
                first,
                second,
            }) => {
                assert_eq!(name, "stop");
                assert_eq!(first, "autoclick");
                assert_eq!(second, "other");
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }

        // Rejected plugin left nothing behind
        assert_eq!(registry.build().len(), 3);
    }

    #[test]
    fn test_duplicate_within_plugin_rejected() {
        let mut registry = CapabilityRegistry::new();
        let twice = PluginDescriptor::new("twice")
            .with_capability(noop("go"))
            .with_capability(noop("go"));
        assert!(matches!(
            registry.register(twice),
            Err(EngineError::DuplicateCapability { .. })
        ));
        assert!(registry.build().is_empty());
    }

    #[test]
    fn test_informational_plugin_only_adds_description() {
        let mut registry = CapabilityRegistry::new();
        registry.register(autoclick()).unwrap();
        let before: Vec<String> = registry.catalog.names().to_vec();

        registry
            .register(PluginDescriptor::new("notes").with_description("D"))
            .unwrap();
        let catalog = registry.build();

        assert!(catalog.description().contains('D'));
        assert_eq!(catalog.names(), before.as_slice());
    }

    #[test]
    fn test_descriptions_joined_in_order_and_blank_skipped() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register(PluginDescriptor::new("a").with_description("first"))
            .unwrap();
        registry
            .register(PluginDescriptor::new("b").with_description("  "))
            .unwrap();
        registry
            .register(PluginDescriptor::new("c").with_description("second"))
            .unwrap();

        assert_eq!(registry.build().description(), "first\nsecond");
    }
}
