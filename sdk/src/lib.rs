//! Spassit SDK
//!
//! Shared library providing the plugin contract for Spassit capability
//! providers. This crate is used by both the engine and the plugins.

/// Capability provider trait and descriptor types
pub mod capability;

/// Error types and handling
pub mod errors;

/// Capability input/output types
pub mod types;

// Re-export commonly used types
pub use capability::{
    Capability, CapabilityFn, CapabilityProvider, ExecutionAffinity, PluginDescriptor,
    PluginSection,
};
pub use errors::{EngineError, ErrorExt};
pub use types::{CapabilityArgs, CapabilityOutput};
