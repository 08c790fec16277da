//! Command handlers for CLI operations
//!
//! - run: interactive session over stdin
//! - ask: one command, then exit
//! - capabilities: list the registered capabilities
//! - doctor: validate configuration and check dependencies

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::asr::select_provider;
use crate::assistant::{Assistant, AssistantOptions};
use crate::capabilities::build_catalog;
use crate::config::Config;
use crate::conversation::FUNCTIONS_PLACEHOLDER;
use crate::message_bus::spawn_event_log;
use crate::pipeline::{Observation, PipelineOutcome};
use crate::plugins::{builtin_providers, PluginDrivers, SharedOverlay};
use crate::presentation::ConsoleOverlay;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Session commands recognized by `run`
#[derive(Debug, PartialEq)]
enum SessionCommand<'a> {
    Say(&'a str),
    Model(&'a str),
    Models,
    Reset,
    Quit,
}

fn parse_session_line(line: &str) -> SessionCommand<'_> {
    match line.split_once(char::is_whitespace) {
        Some(("/model", name)) => SessionCommand::Model(name.trim()),
        _ => match line {
            "/models" => SessionCommand::Models,
            "/reset" => SessionCommand::Reset,
            "/quit" | "/exit" => SessionCommand::Quit,
            text => SessionCommand::Say(text),
        },
    }
}

/// Interactive session: every stdin line is one command
///
/// Lines starting with `/` control the session: `/model NAME`, `/models`,
/// `/reset` and `/quit`.
pub async fn handle_run(
    config: Config,
    config_path: Option<PathBuf>,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut assistant =
        Assistant::start(config, config_path.as_deref()).context("Failed to start assistant")?;
    let events = spawn_event_log(assistant.bus()).await;
    if let Some(model) = model {
        assistant.pipeline().conversation_mut().select_model(&model)?;
    }

    if matches!(format, OutputFormat::Text) {
        println!("Spassit ready. Type a command, /quit to leave.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        match parse_session_line(line.trim()) {
            SessionCommand::Quit => break,
            SessionCommand::Reset => {
                assistant.pipeline().conversation_mut().reset();
                println!("Dialog cleared.");
            }
            SessionCommand::Models => {
                let conversation = assistant.pipeline().conversation();
                for name in conversation.models() {
                    let marker = if name == conversation.model() { "*" } else { " " };
                    println!("{} {}", marker, name);
                }
            }
            SessionCommand::Model(name) => {
                match assistant.pipeline().conversation_mut().select_model(name) {
                    Ok(()) => println!("Model: {}", name),
                    Err(e) => eprintln!("{}", e),
                }
            }
            SessionCommand::Say(text) => match assistant.pipeline().handle_text(text).await {
                Ok(outcome) => print_outcome(&outcome, format)?,
                // The session survives a failed exchange
                Err(e) => eprintln!("Error: {}", e),
            },
        }
    }

    assistant.shutdown()?;
    let logged = events.await?;
    info!("Session finished, {} events", logged);
    Ok(())
}

/// Send one command and exit
pub async fn handle_ask(
    text: String,
    config: Config,
    config_path: Option<PathBuf>,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    handle_ask_with(text, config, config_path, model, format, AssistantOptions::default()).await
}

/// [`handle_ask`] with injected collaborators
pub async fn handle_ask_with(
    text: String,
    config: Config,
    config_path: Option<PathBuf>,
    model: Option<String>,
    format: OutputFormat,
    options: AssistantOptions,
) -> Result<()> {
    let mut assistant = Assistant::start_with(config, config_path.as_deref(), options)
        .context("Failed to start assistant")?;
    let events = spawn_event_log(assistant.bus()).await;
    if let Some(model) = model {
        assistant.pipeline().conversation_mut().select_model(&model)?;
    }

    let result = assistant.pipeline().handle_text(&text).await;
    assistant.shutdown()?;
    events.await?;

    print_outcome(&result?, format)
}

/// List capabilities with the plugin that provides each
pub async fn handle_capabilities(config: &Config, format: OutputFormat) -> Result<()> {
    let overlay: SharedOverlay = Arc::new(Mutex::new(ConsoleOverlay::default()));
    let drivers = PluginDrivers::headless(overlay);
    let (catalog, _) = build_catalog(builtin_providers(&drivers), config)?;

    match format {
        OutputFormat::Text => {
            println!("Capabilities ({}):", catalog.len());
            for entry in catalog.entries() {
                println!(
                    "  {:<18} {:<10} {}",
                    entry.capability.name(),
                    entry.plugin,
                    entry.capability.affinity()
                );
            }
            let description = catalog.description();
            if !description.is_empty() {
                println!();
                println!("{}", description);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "capabilities": catalog.entries().map(|entry| {
                    json!({
                        "name": entry.capability.name(),
                        "plugin": entry.plugin,
                        "affinity": entry.capability.affinity().to_string(),
                    })
                }).collect::<Vec<_>>(),
                "description": catalog.description(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Validate configuration and check dependencies
///
/// Loads the configuration itself so a broken file is reported instead of
/// aborting.
pub async fn handle_doctor(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };

    let config = if !path.exists() {
        checks.push(("Configuration", "Missing".to_string()));
        issues.push(format!(
            "No configuration at {:?}. Run 'spassit run' once to create it.",
            path
        ));
        None
    } else {
        match Config::load_from_path(&path) {
            Ok(config) => {
                checks.push(("Configuration", "Valid".to_string()));
                Some(config)
            }
            Err(e) => {
                checks.push(("Configuration", "Invalid".to_string()));
                issues.push(e.to_string());
                None
            }
        }
    };

    if let Some(config) = &config {
        match reqwest::Url::parse(&config.llm.url) {
            Ok(_) => checks.push(("Endpoint", config.llm.url.clone())),
            Err(e) => {
                checks.push(("Endpoint", "Malformed".to_string()));
                issues.push(format!("llm.url is not a URL: {}", e));
            }
        }
        checks.push(("Models", config.llm.models.join(", ")));
        checks.push(("Dialog window", config.llm.keep_dialog.to_string()));

        let prompt_path = config.system_prompt_path();
        match std::fs::read_to_string(&prompt_path) {
            Ok(prompt) if prompt.contains(FUNCTIONS_PLACEHOLDER) => {
                checks.push(("System prompt", "OK".to_string()));
            }
            Ok(_) => {
                checks.push(("System prompt", "No placeholder".to_string()));
                issues.push(format!(
                    "{:?} has no {} placeholder; plugin descriptions will not reach the model",
                    prompt_path, FUNCTIONS_PLACEHOLDER
                ));
            }
            Err(e) => {
                checks.push(("System prompt", "Unreadable".to_string()));
                issues.push(format!(
                    "Cannot read system prompt {:?}: {}",
                    prompt_path, e
                ));
            }
        }

        match select_provider(&config.asr) {
            Ok(provider) => checks.push(("Speech service", provider.name.clone())),
            Err(_) => {
                checks.push(("Speech service", "Not configured".to_string()));
                issues.push("No [[asr]] provider configured; only typed commands work.".to_string());
            }
        }

        let overlay: SharedOverlay = Arc::new(Mutex::new(ConsoleOverlay::default()));
        let drivers = PluginDrivers::headless(overlay);
        match build_catalog(builtin_providers(&drivers), config) {
            Ok((catalog, _)) => checks.push(("Capabilities", catalog.len().to_string())),
            Err(e) => {
                checks.push(("Capabilities", "Error".to_string()));
                issues.push(format!("Plugin initialization failed: {}", e));
            }
        }
    }

    match format {
        OutputFormat::Text => {
            println!("Spassit Diagnostics");
            println!("===================");
            println!();

            println!("Checks:");
            for (check, status) in &checks {
                println!("  {:<18} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn outcome_json(outcome: &PipelineOutcome) -> serde_json::Value {
    let observation = match &outcome.observation {
        Observation::Reply => json!({ "kind": "reply" }),
        Observation::Silent => json!({ "kind": "silent" }),
        Observation::Invoked { name, output } => {
            json!({ "kind": "invoked", "capability": name, "output": output.data })
        }
        Observation::Failed { name, error } => {
            json!({ "kind": "failed", "capability": name, "error": error })
        }
    };
    json!({
        "transcript": outcome.transcript,
        "reply": outcome.reply,
        "model_elapsed_ms": outcome.model_elapsed.as_millis() as u64,
        "asr_elapsed_ms": outcome.asr_elapsed.map(|d| d.as_millis() as u64),
        "observation": observation,
    })
}

fn print_outcome(outcome: &PipelineOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(transcript) = &outcome.transcript {
                println!("> {}", transcript);
            }
            if outcome.observation != Observation::Silent {
                println!("[{} ms]", outcome.model_elapsed.as_millis());
            }
            match &outcome.observation {
                Observation::Silent => {}
                Observation::Reply => println!("{}", outcome.reply),
                Observation::Invoked { name, output } => {
                    println!("→ {} {}", name, output.to_json());
                }
                Observation::Failed { name, error } => {
                    println!("✗ {}: {}", name, error);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&outcome_json(outcome))?);
        }
    }
    Ok(())
}
