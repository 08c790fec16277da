//! Language model exchange types
//!
//! This module defines the chat message model shared by the conversation
//! manager and the transport, the transport error type, and the parser that
//! pulls a capability call out of the assistant's reply text.

use serde::{Deserialize, Serialize};
use std::fmt;

use sdk::errors::EngineError;

pub mod transport;

pub use transport::{ChatTransport, HttpChatTransport};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for EngineError {
    fn from(e: LLMError) -> Self {
        EngineError::RemoteCall(e.to_string())
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Capability call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the capability to call
    pub name: String,

    /// Arguments to pass to the capability (JSON text, may be empty)
    pub arguments: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Parse a capability call from the assistant's reply text.
///
/// Handles multiple output formats:
/// 1. Raw JSON: `{"function": "...", "arguments": {...}}`
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. `<tool_call>name({...})</tool_call>` markers
/// 4. JSON embedded in prose, found by scanning for `{"function":`
///
/// Returns `None` for a plain reply.
pub fn parse_tool_calls(content: &str) -> Option<ToolCall> {
    let trimmed = content.trim();

    // Pattern 1: the whole reply is the call
    if let Some(tc) = try_parse_function_json(trimmed) {
        return Some(tc);
    }

    // Pattern 2: markdown code fence, even with trailing text
    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(tc) = try_parse_function_json(inner.trim()) {
            return Some(tc);
        }
    }

    // Pattern 3: <tool_call>name({...})</tool_call>
    if let Some(start) = trimmed.find("<tool_call>") {
        let body = &trimmed[start + "<tool_call>".len()..];
        // Only a closing marker after the opening one counts
        if let Some(tool_content) = body.find("</tool_call>").map(|end| &body[..end]) {
            if let Some(paren_pos) = tool_content.find('(') {
                let tool_name = &tool_content[..paren_pos];
                let args_end = tool_content.rfind(')').unwrap_or(tool_content.len());
                let arguments = tool_content.get(paren_pos + 1..args_end).unwrap_or("");

                return Some(ToolCall::new(tool_name.trim(), arguments.trim()));
            }
        }
    }

    // Pattern 4: {"function": somewhere in mixed prose
    if let Some(pos) = trimmed.find("{\"function\"") {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(tc) = try_parse_function_json(json_str) {
                return Some(tc);
            }
        }
    }

    None
}

/// Try to parse a string as a `{"function": "...", "arguments": ...}` call.
///
/// `arguments` is optional; a capability such as `stop` takes none.
fn try_parse_function_json(s: &str) -> Option<ToolCall> {
    let json: serde_json::Value = serde_json::from_str(s).ok()?;
    let function = json.get("function")?.as_str()?;
    let arguments = match json.get("arguments") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
    };
    Some(ToolCall::new(function, arguments))
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("打开记事本");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "打开记事本");

        assert_eq!(Message::assistant("ok").role, MessageRole::Assistant);
        assert_eq!(Message::system("prompt").role, MessageRole::System);
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_llm_error_becomes_remote_call() {
        let err: EngineError = LLMError::RateLimitExceeded.into();
        assert!(matches!(err, EngineError::RemoteCall(_)));
    }

    #[test]
    fn test_parse_raw_json() {
        let tc = parse_tool_calls(r#"{"function": "setInterval", "arguments": {"interval": 0.01}}"#)
            .unwrap();
        assert_eq!(tc.name, "setInterval");
        let args: serde_json::Value = serde_json::from_str(&tc.arguments).unwrap();
        assert_eq!(args["interval"], 0.01);
    }

    #[test]
    fn test_parse_without_arguments() {
        let tc = parse_tool_calls(r#"{"function": "stop"}"#).unwrap();
        assert_eq!(tc.name, "stop");
        assert!(tc.arguments.is_empty());
    }

    #[test]
    fn test_parse_fenced_with_trailing_text() {
        let content = "好的。\n```json\n{\"function\": \"startProgram\", \"arguments\": {\"query\": \"notepad\"}}\n```\n马上打开。";
        let tc = parse_tool_calls(content).unwrap();
        assert_eq!(tc.name, "startProgram");
    }

    #[test]
    fn test_parse_tool_call_markers() {
        let tc = parse_tool_calls(r#"<tool_call>startProgram({"query": "chrome"})</tool_call>"#)
            .unwrap();
        assert_eq!(tc.name, "startProgram");
        assert_eq!(tc.arguments, r#"{"query": "chrome"}"#);
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        let content = r#"I will start clicking now {"function": "start", "arguments": {}} done"#;
        let tc = parse_tool_calls(content).unwrap();
        assert_eq!(tc.name, "start");
        assert_eq!(tc.arguments, "{}");
    }

    #[test]
    fn test_stray_closing_marker_falls_through() {
        let reply = r#"</tool_call> 好的 {"function": "stop"} <tool_call>"#;
        let call = parse_tool_calls(reply).unwrap();
        assert_eq!(call.name, "stop");
        assert_eq!(call.arguments, "");

        let reply = "</tool_call> then <tool_call>startProgram({\"query\": \"qq\"})</tool_call>";
        let call = parse_tool_calls(reply).unwrap();
        assert_eq!(call.name, "startProgram");
        assert_eq!(call.arguments, r#"{"query": "qq"}"#);
    }

    #[test]
    fn test_plain_reply() {
        assert!(parse_tool_calls("今天天气不错。").is_none());
        assert!(parse_tool_calls(r#"{"answer": 42}"#).is_none());
    }

    #[test]
    fn test_balanced_json_respects_strings() {
        let s = r#"{"function": "x", "arguments": {"q": "a}b"}} tail"#;
        assert_eq!(
            extract_balanced_json(s),
            Some(r#"{"function": "x", "arguments": {"q": "a}b"}}"#)
        );
    }
}
