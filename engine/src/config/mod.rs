//! Configuration management
//!
//! This module handles loading, validation, and persistence of the Spassit
//! configuration. Configuration is stored in TOML format at
//! ~/.spassit/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: log level
//! - **llm**: endpoint, credential, candidate models, system prompt path,
//!   dialog window size and the request payload template
//! - **asr**: speech recognition providers, highest priority wins
//! - **status**: pipeline phase labels and surface placement
//! - **plugins**: one free-form subsection per plugin, owned by the plugin
//!
//! Plugins may write defaults into their subsection on first run. The engine
//! copies those sections back with [`Config::absorb_plugin_sections`] and
//! persists them with [`Config::save_to_path`].
//!
//! # Examples
//!
//! ```no_run
//! use spassit_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Endpoint: {}", config.llm.url);
//! println!("Keep dialog: {}", config.llm.keep_dialog);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use sdk::PluginSection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conversation::DEFAULT_SYSTEM_PROMPT;
use crate::secrets::SecretString;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Remote model settings
    pub llm: LlmConfig,

    /// Speech recognition providers
    #[serde(default)]
    pub asr: Vec<AsrProviderConfig>,

    /// Pipeline status surface
    #[serde(default)]
    pub status: StatusConfig,

    /// Per-plugin subsections, keyed by plugin name
    #[serde(default)]
    pub plugins: toml::Table,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Remote model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat completions endpoint (full URL)
    #[serde(default)]
    pub url: String,

    /// Bearer credential
    #[serde(default)]
    pub key: SecretString,

    /// Candidate model identifiers, the first one is used at startup
    #[serde(default)]
    pub models: Vec<String>,

    /// System prompt template file as written (supports ~ expansion)
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt: PathBuf,

    /// Where `system_prompt` points once loaded; never written back
    #[serde(skip)]
    pub resolved_prompt: Option<PathBuf>,

    /// Number of dialog turns kept besides the system prompt
    #[serde(default = "default_keep_dialog")]
    pub keep_dialog: usize,

    /// Extra request fields (temperature, max_tokens, ...)
    #[serde(default)]
    pub payload: toml::Table,
}

/// One speech recognition provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrProviderConfig {
    /// Provider name
    pub name: String,

    /// Higher wins
    #[serde(default)]
    pub priority: i64,

    /// Provider credentials and options
    #[serde(flatten)]
    pub settings: toml::Table,
}

/// Status surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Ordered phase labels
    #[serde(default = "default_phases")]
    pub phases: Vec<String>,

    /// Distance from the left screen edge
    #[serde(default = "default_margin_left")]
    pub margin_left: i32,

    /// Distance from the bottom screen edge
    #[serde(default = "default_margin_bottom")]
    pub margin_bottom: i32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            phases: default_phases(),
            margin_left: default_margin_left(),
            margin_bottom: default_margin_bottom(),
        }
    }
}

/// Pipeline stages shown on the status surface: recording, recognizing,
/// processing
pub const STATUS_PHASES: usize = 3;

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_system_prompt_path() -> PathBuf {
    PathBuf::from("~/.spassit/prompts.txt")
}

fn default_keep_dialog() -> usize {
    3
}

fn default_phases() -> Vec<String> {
    vec![
        "正在录音".to_string(),
        "识别中".to_string(),
        "处理中".to_string(),
    ]
}

fn default_margin_left() -> i32 {
    60
}

fn default_margin_bottom() -> i32 {
    75
}

impl Config {
    /// Load configuration from the default location (~/.spassit/config.toml)
    ///
    /// If the configuration file doesn't exist, a default configuration and a
    /// default system prompt are written first. The default has no endpoint or
    /// key, so validation then fails with a message pointing at the new file.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// A relative `llm.system_prompt` is resolved against the directory that
    /// holds the configuration file.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&contents)?;
        config.validate_and_process()?;

        if config.llm.system_prompt.is_relative() && !starts_with_tilde(&config.llm.system_prompt)
        {
            if let Some(dir) = path.parent() {
                config.llm.resolved_prompt = Some(dir.join(&config.llm.system_prompt));
            }
        }
        Ok(config)
    }

    /// Parse configuration text without validating it
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Write the configuration back to disk
    pub fn save_to_path(&self, path: &Path) -> Result<(), EngineError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.save_to_path(path)?;

        let prompt_path = expand_path(&config.llm.system_prompt)?;
        if !prompt_path.exists() {
            fs::write(&prompt_path, DEFAULT_SYSTEM_PROMPT).map_err(|e| {
                EngineError::Config(format!("Failed to write default system prompt: {}", e))
            })?;
        }

        config.validate_and_process().map_err(|e| match e {
            EngineError::Config(msg) => EngineError::Config(format!(
                "{} (a default configuration was written to {:?}, fill it in)",
                msg, path
            )),
            other => other,
        })?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.spassit/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".spassit").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            llm: LlmConfig {
                url: String::new(),
                key: SecretString::default(),
                models: Vec::new(),
                system_prompt: default_system_prompt_path(),
                resolved_prompt: None,
                keep_dialog: default_keep_dialog(),
                payload: toml::Table::new(),
            },
            asr: Vec::new(),
            status: StatusConfig::default(),
            plugins: toml::Table::new(),
        }
    }

    /// Validate and process configuration
    ///
    /// Every missing required key is fatal: startup aborts with
    /// `EngineError::Config`.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.llm.url.trim().is_empty() {
            return Err(EngineError::Config("llm.url is missing".to_string()));
        }
        if self.llm.key.is_blank() {
            return Err(EngineError::Config("llm.key is missing".to_string()));
        }
        if self.llm.models.is_empty() {
            return Err(EngineError::Config(
                "llm.models must list at least one model".to_string(),
            ));
        }
        if self.llm.keep_dialog == 0 {
            return Err(EngineError::Config(
                "llm.keep_dialog must be at least 1".to_string(),
            ));
        }
        if self.llm.payload.contains_key("messages") || self.llm.payload.contains_key("model") {
            return Err(EngineError::Config(
                "llm.payload must not set 'messages' or 'model'".to_string(),
            ));
        }
        if self.status.phases.len() != STATUS_PHASES {
            return Err(EngineError::Config(format!(
                "status.phases must list {} labels (recording, recognizing, processing), got {}",
                STATUS_PHASES,
                self.status.phases.len()
            )));
        }

        self.llm.resolved_prompt = Some(expand_path(&self.llm.system_prompt)?);

        Ok(())
    }

    /// System prompt file to read, with `~` and relative paths resolved
    pub fn system_prompt_path(&self) -> PathBuf {
        self.llm
            .resolved_prompt
            .clone()
            .unwrap_or_else(|| self.llm.system_prompt.clone())
    }

    /// The payload template as JSON
    pub fn payload_template(&self) -> Result<serde_json::Value, EngineError> {
        serde_json::to_value(&self.llm.payload)
            .map_err(|e| EngineError::Config(format!("Invalid llm.payload: {}", e)))
    }

    /// Handle onto one plugin's subsection
    ///
    /// Non-table values under `[plugins]` are treated as a missing section.
    pub fn plugin_section(&self, name: &str) -> PluginSection {
        match self.plugins.get(name) {
            Some(toml::Value::Table(table)) => match serde_json::to_value(table) {
                Ok(serde_json::Value::Object(map)) => PluginSection::existing(name, map),
                _ => PluginSection::missing(name),
            },
            _ => PluginSection::missing(name),
        }
    }

    /// Copy changed plugin sections back into the configuration
    ///
    /// Returns true when at least one section changed and the file should be
    /// saved.
    pub fn absorb_plugin_sections(
        &mut self,
        sections: &[PluginSection],
    ) -> Result<bool, EngineError> {
        let mut changed = false;
        for section in sections.iter().filter(|s| s.is_dirty()) {
            let json = serde_json::Value::Object(section.snapshot());
            let value = toml::Value::try_from(json).map_err(|e| {
                EngineError::Config(format!(
                    "Plugin '{}' wrote a value TOML cannot hold: {}",
                    section.name(),
                    e
                ))
            })?;
            self.plugins.insert(section.name().to_string(), value);
            changed = true;
        }
        Ok(changed)
    }
}

fn starts_with_tilde(path: &Path) -> bool {
    path.to_str().map(|s| s.starts_with('~')).unwrap_or(false)
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
