//! End-to-end command pipeline
//!
//! recording → recognition → model exchange → capability dispatch, with the
//! status surface advanced in lockstep. The status advances the same way
//! whatever the dispatch outcome; any error on the way closes it at once.

use std::sync::Arc;
use std::time::Duration;

use sdk::errors::EngineError;
use sdk::types::CapabilityOutput;
use tracing::{debug, info, warn};

use crate::asr::{AudioClip, Transcriber};
use crate::capabilities::DispatchRouter;
use crate::conversation::ConversationContext;
use crate::llm::parse_tool_calls;
use crate::message_bus::{Event, MessageBus};
use crate::status::StatusHandle;

/// What happened after the model replied
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Plain reply, nothing dispatched
    Reply,

    /// Capability ran
    Invoked {
        name: String,
        output: CapabilityOutput,
    },

    /// Capability missing, arguments rejected or execution failed
    Failed { name: String, error: String },

    /// Nothing was said; the model was not called
    Silent,
}

/// Result of one pass through the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Recognized text, `None` for typed commands
    pub transcript: Option<String>,
    pub reply: String,
    pub asr_elapsed: Option<Duration>,
    pub model_elapsed: Duration,
    pub observation: Observation,
}

impl PipelineOutcome {
    fn silent(transcript: Option<String>, asr_elapsed: Option<Duration>) -> Self {
        Self {
            transcript,
            reply: String::new(),
            asr_elapsed,
            model_elapsed: Duration::ZERO,
            observation: Observation::Silent,
        }
    }
}

/// Orchestrates one command at a time
pub struct Pipeline {
    conversation: ConversationContext,
    router: DispatchRouter,
    status: StatusHandle,
    transcriber: Arc<dyn Transcriber>,
    bus: MessageBus,
    recording: bool,
}

impl Pipeline {
    pub fn new(
        conversation: ConversationContext,
        router: DispatchRouter,
        status: StatusHandle,
        transcriber: Arc<dyn Transcriber>,
        bus: MessageBus,
    ) -> Self {
        Self {
            conversation,
            router,
            status,
            transcriber,
            bus,
            recording: false,
        }
    }

    /// Show the recording phase while the capture collaborator records
    pub fn begin_recording(&mut self) {
        self.recording = true;
        self.status.create();
    }

    /// Process a finished recording.
    ///
    /// Shows the recording phase first if [`begin_recording`](Self::begin_recording)
    /// was not called.
    pub async fn handle_recording(&mut self, clip: AudioClip) -> Result<PipelineOutcome, EngineError> {
        if !std::mem::take(&mut self.recording) {
            self.status.create();
        }

        let result = self.run_recording(clip).await;
        self.finish(&result);
        result
    }

    /// Typed command.
    ///
    /// The text stands in for the recording and its transcript, so the
    /// recording and recognition phases pass straight through to processing.
    pub async fn handle_text(&mut self, text: &str) -> Result<PipelineOutcome, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(PipelineOutcome::silent(None, None));
        }

        self.status.create();
        self.status.advance();
        self.status.advance();

        let result = self
            .converse(text)
            .await
            .map(|(reply, model_elapsed, observation)| PipelineOutcome {
                transcript: None,
                reply,
                asr_elapsed: None,
                model_elapsed,
                observation,
            });
        self.finish(&result);
        result
    }

    pub fn conversation(&self) -> &ConversationContext {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationContext {
        &mut self.conversation
    }

    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    /// Hide the surface: past the last phase on success, at once otherwise
    fn finish(&self, result: &Result<PipelineOutcome, EngineError>) {
        match result {
            Ok(outcome) if outcome.observation == Observation::Silent => self.status.force_close(),
            Ok(_) => self.status.advance(),
            Err(e) => {
                warn!("Pipeline aborted: {}", e);
                self.status.force_close();
            }
        }
    }

    async fn run_recording(&mut self, clip: AudioClip) -> Result<PipelineOutcome, EngineError> {
        self.status.advance();

        if clip.is_empty() {
            info!("Empty recording, nothing to do");
            return Ok(PipelineOutcome::silent(None, None));
        }
        debug!("Recording: {:?}, {} samples", clip.duration, clip.samples.len());

        let (transcript, asr_elapsed) = self.transcriber.transcribe(&clip).await?;
        info!(
            provider = self.transcriber.name(),
            elapsed_ms = asr_elapsed.as_millis() as u64,
            "Recognized: {}",
            transcript
        );
        if transcript.trim().is_empty() {
            return Ok(PipelineOutcome::silent(Some(transcript), Some(asr_elapsed)));
        }

        self.status.advance();

        let (reply, model_elapsed, observation) = self.converse(transcript.trim()).await?;
        Ok(PipelineOutcome {
            transcript: Some(transcript),
            reply,
            asr_elapsed: Some(asr_elapsed),
            model_elapsed,
            observation,
        })
    }

    /// Model exchange plus dispatch of whatever capability the reply names
    async fn converse(&mut self, text: &str) -> Result<(String, Duration, Observation), EngineError> {
        let (reply, elapsed) = self.conversation.call(text).await?;
        info!("Reply ({:?}): {}", elapsed, reply);

        let Some(call) = parse_tool_calls(&reply) else {
            return Ok((reply, elapsed, Observation::Reply));
        };

        let args = if call.arguments.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&call.arguments)
                .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()))
        };
        self.bus
            .publish(Event::CapabilityInvoked {
                name: call.name.clone(),
                args,
            })
            .await;

        let observation = match self.router.dispatch_raw(&call.name, &call.arguments).await {
            Ok(output) => Observation::Invoked {
                name: call.name,
                output,
            },
            Err(e) if e.is_dispatch_failure() => {
                self.bus
                    .publish(Event::CapabilityFailed {
                        name: call.name.clone(),
                        error: e.to_string(),
                    })
                    .await;
                Observation::Failed {
                    name: call.name,
                    error: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        Ok((reply, elapsed, observation))
    }
}
