//! Conversation Context Manager
//!
//! Owns the dialog history sent to the model. Message 0 is always the system
//! prompt, built from the prompt file with the capability catalog description
//! substituted for [`FUNCTIONS_PLACEHOLDER`]. After every exchange the history
//! is cut back to the system prompt plus the most recent `keep_dialog` turns.
//!
//! The prompt file is watched by modification time: editing it takes effect
//! on the next call without a restart.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use sdk::errors::EngineError;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llm::{ChatTransport, Message, MessageRole};
use crate::message_bus::{Event, MessageBus};

/// Placeholder in the system prompt replaced by the catalog description
pub const FUNCTIONS_PLACEHOLDER: &str = "{$functions}";

/// System prompt written on first run
pub const DEFAULT_SYSTEM_PROMPT: &str = r##"你是 Spassit，一个通过语音控制电脑的助手。用户的话来自语音识别，可能有错别字，请按最接近的意思理解。

规则：
1. 需要执行操作时，你的整个回复必须只有一个 JSON 对象，不要有任何解释、代码块标记或其他文字。
2. 不需要执行操作时，用一两句简短的中文直接回答。
3. 不要编造不存在的功能或程序。

调用格式：
{"function": "功能名", "arguments": {"参数名": "参数值"}}

可用的功能：
- start: 开启连点，按住鼠标侧键 2 左键连点，按住侧键 1 右键连点。参数：无
- stop: 关闭连点。参数：无
- setInterval: 设置连点间隔（秒）。参数：{"interval": 0.01}
- startProgram: 打开程序。参数：{"query": "程序名"}
- startCrosshair: 显示准星。参数：无
- stopCrosshair: 隐藏准星。参数：无
- updateCrosshair: 修改准星。参数：{"color": "#00FF00", "size": 20, "line_width": 2}

{$functions}
"##;

/// Dialog history plus everything needed to talk to the model
pub struct ConversationContext {
    transport: Arc<dyn ChatTransport>,
    payload: serde_json::Map<String, serde_json::Value>,
    messages: Vec<Message>,
    prompt_path: PathBuf,
    prompt_modified: Option<SystemTime>,
    functions: String,
    models: Vec<String>,
    model: String,
    keep_dialog: usize,
    bus: Option<MessageBus>,
}

impl ConversationContext {
    /// Build the context from configuration.
    ///
    /// Loads the payload template and the system prompt, substitutes
    /// `functions` into it, records the prompt's modification time and
    /// selects the first configured model.
    pub fn new(
        config: &Config,
        functions: &str,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, EngineError> {
        let payload = match config.payload_template()? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        let model = config
            .llm
            .models
            .first()
            .cloned()
            .ok_or_else(|| EngineError::Config("llm.models is empty".to_string()))?;

        let prompt_path = config.system_prompt_path();
        let template = fs::read_to_string(&prompt_path).map_err(|e| {
            EngineError::Config(format!(
                "Failed to read system prompt {:?}: {}",
                prompt_path, e
            ))
        })?;
        let prompt_modified = modified_time(&prompt_path);

        info!("Conversation ready, model: {}", model);
        debug!("System prompt: {:?}", prompt_path);

        Ok(Self {
            transport,
            payload,
            messages: vec![Message::system(render_prompt(&template, functions))],
            prompt_path,
            prompt_modified,
            functions: functions.to_string(),
            models: config.llm.models.clone(),
            model,
            keep_dialog: config.llm.keep_dialog.max(1),
            bus: None,
        })
    }

    /// Publish `PromptReloaded` and `DialogCompleted` on `bus`
    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// One exchange with the model.
    ///
    /// Returns the reply text and the wall time of the remote call. On
    /// failure the unanswered user message is taken back out of the history
    /// and the error is returned as is.
    pub async fn call(&mut self, prompt: &str) -> Result<(String, Duration), EngineError> {
        if self.reload_prompt_if_changed() {
            if let Some(bus) = &self.bus {
                bus.publish(Event::PromptReloaded).await;
            }
        }

        self.messages.push(Message::user(prompt));

        let body = self.request_body();
        let started = Instant::now();
        let result = self.transport.complete(&body).await;
        let elapsed = started.elapsed();

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                self.messages.pop();
                warn!("Model call failed after {:?}: {}", elapsed, e);
                return Err(e.into());
            }
        };

        self.messages.push(Message::assistant(reply.clone()));
        self.truncate();

        info!(
            model = %self.model,
            elapsed_ms = elapsed.as_millis() as u64,
            "Model replied"
        );
        if let Some(bus) = &self.bus {
            bus.publish(Event::DialogCompleted {
                model: self.model.clone(),
                elapsed_ms: elapsed.as_millis(),
            })
            .await;
        }

        Ok((reply, elapsed))
    }

    /// Switch to another configured model
    pub fn select_model(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.models.iter().any(|m| m == name) {
            return Err(EngineError::Config(format!(
                "Model '{}' is not listed in llm.models",
                name
            )));
        }
        info!("Switching model {} -> {}", self.model, name);
        self.model = name.to_string();
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Drop every dialog turn, keeping the system prompt
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn keep_dialog(&self) -> usize {
        self.keep_dialog
    }

    fn request_body(&self) -> serde_json::Value {
        let mut body = self.payload.clone();
        body.insert(
            "model".to_string(),
            serde_json::Value::String(self.model.clone()),
        );
        body.insert(
            "messages".to_string(),
            serde_json::to_value(&self.messages).unwrap_or_default(),
        );
        serde_json::Value::Object(body)
    }

    /// Keep message 0 plus the last `2 * keep_dialog` messages
    fn truncate(&mut self) {
        let window = 2 * self.keep_dialog;
        if self.messages.len() > 1 + window {
            let cut = self.messages.len() - window;
            self.messages.drain(1..cut);
        }
        debug_assert_eq!(self.messages[0].role, MessageRole::System);
    }

    /// Reload message 0 when the prompt file changed on disk.
    ///
    /// A prompt file that disappeared or cannot be read keeps the old prompt.
    fn reload_prompt_if_changed(&mut self) -> bool {
        let modified = modified_time(&self.prompt_path);
        if modified.is_none() || modified == self.prompt_modified {
            return false;
        }

        match fs::read_to_string(&self.prompt_path) {
            Ok(template) => {
                self.prompt_modified = modified;
                self.messages[0].content = render_prompt(&template, &self.functions);
                info!("System prompt reloaded from {:?}", self.prompt_path);
                true
            }
            Err(e) => {
                warn!("System prompt changed but could not be read: {}", e);
                false
            }
        }
    }
}

fn render_prompt(template: &str, functions: &str) -> String {
    template.replace(FUNCTIONS_PLACEHOLDER, functions)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
