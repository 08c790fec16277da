//! Assistant startup and shutdown
//!
//! Wires every component together from a validated [`Config`]: plugins and
//! the capability catalog, the conversation, the status controller, the
//! action marshal and the presentation thread. Startup order matters only in
//! one place: plugins initialize before the conversation, because the
//! catalog description is substituted into the system prompt.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sdk::errors::EngineError;
use sdk::PluginSection;
use tracing::{info, warn};

use crate::asr::{log_provider, select_provider, Transcriber, UnavailableTranscriber};
use crate::capabilities::{build_catalog, DispatchRouter};
use crate::config::Config;
use crate::conversation::ConversationContext;
use crate::llm::{ChatTransport, HttpChatTransport};
use crate::marshal;
use crate::message_bus::MessageBus;
use crate::pipeline::Pipeline;
use crate::plugins::{builtin_providers, PluginDrivers, SharedOverlay};
use crate::presentation::{ConsoleOverlay, ConsoleSurface, PresentationHandle, PresentationLoop};
use crate::status::{controller, Placement, StatusMachine, StatusSurface};

/// Collaborators the assistant would otherwise build itself
#[derive(Default)]
pub struct AssistantOptions {
    /// Model transport, defaults to HTTP against `llm.url`
    pub transport: Option<Arc<dyn ChatTransport>>,

    /// Speech service, defaults to the highest-priority `[[asr]]` entry
    pub transcriber: Option<Arc<dyn Transcriber>>,

    /// Plugin drivers, defaults to headless drivers
    pub drivers: Option<PluginDrivers>,

    /// Status surface, defaults to the console
    pub surface: Option<Box<dyn StatusSurface + Send>>,

    /// Shared event bus, a fresh one otherwise
    pub bus: Option<MessageBus>,
}

/// A running assistant
pub struct Assistant {
    config: Config,
    config_path: Option<PathBuf>,
    sections: Vec<PluginSection>,
    pipeline: Pipeline,
    presentation: PresentationHandle,
    bus: MessageBus,
}

impl Assistant {
    /// Start with the default collaborators
    pub fn start(config: Config, config_path: Option<&Path>) -> Result<Self, EngineError> {
        Self::start_with(config, config_path, AssistantOptions::default())
    }

    /// Start the assistant.
    ///
    /// When `config_path` is given, plugin defaults written during startup
    /// are saved back to it.
    pub fn start_with(
        mut config: Config,
        config_path: Option<&Path>,
        options: AssistantOptions,
    ) -> Result<Self, EngineError> {
        info!("URL: {}", config.llm.url);
        info!("KEY: {}", config.llm.key.masked());
        info!("Models: {}", config.llm.models.join(", "));

        let bus = options.bus.unwrap_or_default();

        let drivers = match options.drivers {
            Some(drivers) => drivers,
            None => {
                let overlay: SharedOverlay = Arc::new(Mutex::new(ConsoleOverlay::default()));
                PluginDrivers::headless(overlay)
            }
        };
        let (catalog, sections) = build_catalog(builtin_providers(&drivers), &config)?;
        info!(
            "{} capabilities registered: {}",
            catalog.len(),
            catalog.names().join(", ")
        );

        if config.absorb_plugin_sections(&sections)? {
            if let Some(path) = config_path {
                config.save_to_path(path)?;
                info!("Plugin defaults written to {:?}", path);
            }
        }

        let transport: Arc<dyn ChatTransport> = match options.transport {
            Some(transport) => transport,
            None => Arc::new(HttpChatTransport::new(
                config.llm.url.clone(),
                config.llm.key.clone(),
            )),
        };
        let conversation = ConversationContext::new(&config, &catalog.description(), transport)?
            .with_bus(bus.clone());

        let transcriber = match options.transcriber {
            Some(transcriber) => transcriber,
            None => default_transcriber(&config),
        };

        let (marshal, executor) = marshal::channel();
        let (status, consumer) = controller::channel(
            StatusMachine::from_config(&config.status),
            Placement {
                margin_left: config.status.margin_left,
                margin_bottom: config.status.margin_bottom,
            },
        );
        let surface = options
            .surface
            .unwrap_or_else(|| Box::new(ConsoleSurface::new()));
        let presentation =
            PresentationLoop::new(executor, consumer.with_bus(bus.clone()), surface).spawn()?;

        let router = DispatchRouter::new(Arc::new(catalog), marshal);
        let pipeline = Pipeline::new(conversation, router, status, transcriber, bus.clone());

        Ok(Self {
            config,
            config_path: config_path.map(Path::to_path_buf),
            sections,
            pipeline,
            presentation,
            bus,
        })
    }

    pub fn pipeline(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persist plugin changes, then stop the presentation thread once every
    /// queued action and status change has been served.
    pub fn shutdown(self) -> Result<(), EngineError> {
        let Self {
            mut config,
            config_path,
            sections,
            pipeline,
            presentation,
            ..
        } = self;

        // Dropping the pipeline drops the last marshal and status handles
        drop(pipeline);
        presentation.join()?;

        if config.absorb_plugin_sections(&sections)? {
            if let Some(path) = &config_path {
                config.save_to_path(path)?;
                info!("Plugin settings saved to {:?}", path);
            }
        }
        info!("Assistant stopped");
        Ok(())
    }
}

/// Highest-priority configured speech service
///
/// Without one, voice input fails at recognition and typed commands still
/// work.
fn default_transcriber(config: &Config) -> Arc<dyn Transcriber> {
    match select_provider(&config.asr) {
        Ok(provider) => {
            log_provider(provider);
            Arc::new(UnavailableTranscriber::new(provider.name.clone()))
        }
        Err(e) => {
            warn!("Voice input disabled: {}", e);
            Arc::new(UnavailableTranscriber::new("none"))
        }
    }
}
