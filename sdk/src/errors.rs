//! Error types and handling
//!
//! This module provides the error types shared by the Spassit engine and the
//! capability plugins. All errors implement the `ErrorExt` trait which provides
//! user-friendly hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints are static strings. They never echo the wrapped detail, so an API
//! key or a prompt fragment carried inside an error cannot leak through them.

use thiserror::Error;

/// Trait for Spassit error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors are reported back into the conversation loop.
    /// Non-recoverable errors abort startup or the presentation thread.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: missing or invalid configuration, fatal at startup
/// - **Remote call**: model or ASR transport and response-shape failures
/// - **Capability**: lookup, argument and execution failures during dispatch
/// - **Registry**: duplicate capability names across plugins
/// - **Marshal**: the presentation thread is gone
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::CapabilityNotFound("fly".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("llm.url is missing".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("Capability '{name}' registered by both '{first}' and '{second}'")]
    DuplicateCapability {
        name: String,
        first: String,
        second: String,
    },

    #[error("Invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Capability '{name}' failed: {reason}")]
    CapabilityFailed { name: String, reason: String },

    #[error("Action marshal closed")]
    MarshalClosed,

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Build an `InvalidArguments` error for a capability
    pub fn invalid_args(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build a `CapabilityFailed` error for a capability
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CapabilityFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the dispatch family that the conversation
    /// loop turns into a failed-call observation.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            Self::CapabilityNotFound(_) | Self::InvalidArguments { .. } | Self::CapabilityFailed { .. }
        )
    }
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::RemoteCall(_) => "Model service unavailable. Check the endpoint, key and network",
            Self::CapabilityNotFound(_) => "The requested capability is not available",
            Self::DuplicateCapability { .. } => {
                "Two plugins expose the same capability name. Disable one of them"
            }
            Self::InvalidArguments { .. } => "The capability was called with unexpected arguments",
            Self::CapabilityFailed { .. } => "Capability execution failed. Check the logs",
            Self::MarshalClosed => "The presentation thread has stopped. Restart Spassit",
            Self::Plugin(_) => "Plugin initialization failed. Check its config section",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::DuplicateCapability { .. } | Self::MarshalClosed => false,
            _ => true,
        }
    }
}
