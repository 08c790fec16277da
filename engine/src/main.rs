// Spassit desktop voice assistant
// Main entry point for the spassit binary

use clap::Parser;
use spassit_engine::cli::{Cli, Command};
use spassit_engine::config::Config;
use spassit_engine::handlers::{
    handle_ask, handle_capabilities, handle_doctor, handle_run, OutputFormat,
};
use spassit_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A --log flag wins over the configured level
    if let Some(level) = &cli.log {
        init_telemetry_with_level(level);
    }

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let command = match cli.command {
        // Doctor loads the configuration itself and reports what is wrong with it
        Command::Doctor => {
            init_telemetry_with_level("warn");
            return handle_doctor(cli.config.as_deref(), format).await;
        }
        command => command,
    };

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let config = if cli.config.is_some() {
        Config::load_from_path(&config_path)?
    } else {
        Config::load_or_create()?
    };

    // Only takes effect if neither --log nor RUST_LOG already decided
    init_telemetry_with_level(&config.core.log_level);

    tracing::info!("Spassit v{} ({} - {})", version, commit, timestamp);

    match command {
        Command::Run { model } => handle_run(config, Some(config_path), model, format).await,

        Command::Ask { text, model } => {
            handle_ask(text, config, Some(config_path), model, format).await
        }

        Command::Capabilities => handle_capabilities(&config, format).await,

        Command::Doctor => handle_doctor(Some(&config_path), format).await,
    }
}
