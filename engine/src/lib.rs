//! Spassit Engine Library
//!
//! Core of the Spassit desktop assistant: configuration, the model
//! conversation, capability dispatch, the status surface and the
//! presentation thread. It is used by both the main binary and integration
//! tests.

/// Configuration management module
pub mod config;

/// Credential handling module
pub mod secrets;

/// Message bus for pipeline notifications
pub mod message_bus;

/// Chat model transport and reply parsing
pub mod llm;

/// Dialog history and system prompt
pub mod conversation;

/// Speech recognition contract
pub mod asr;

/// Capability catalog and dispatch
pub mod capabilities;

/// Built-in plugins
pub mod plugins;

/// Worker to presentation thread handoff
pub mod marshal;

/// Pipeline status surface
pub mod status;

/// Presentation thread and its surfaces
pub mod presentation;

/// Recording to dispatch pipeline
pub mod pipeline;

/// Component wiring
pub mod assistant;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
