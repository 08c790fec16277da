//! CLI interface for Spassit
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spassit desktop voice assistant
///
/// Turns spoken or typed commands into actions on this machine: the model
/// picks a capability from the registered plugins and the engine runs it.
#[derive(Parser, Debug)]
#[command(name = "spassit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the assistant and read commands from stdin, one per line
    Run {
        /// Model to use instead of the first configured one
        #[arg(long)]
        model: Option<String>,
    },

    /// Send a single command and exit
    Ask {
        /// The command text
        text: String,

        /// Model to use instead of the first configured one
        #[arg(long)]
        model: Option<String>,
    },

    /// List registered capabilities and the plugins providing them
    Capabilities,

    /// Check configuration, system prompt and providers
    Doctor,
}
