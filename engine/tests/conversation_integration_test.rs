//! Integration tests for the model exchange over HTTP
//!
//! Runs the assistant against a mock chat completions endpoint:
//! - request shape (payload template, model, dialog window, credential)
//! - system prompt hot reload between calls
//! - error statuses surfacing as remote call failures

use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

use sdk::errors::EngineError;
use spassit_engine::assistant::{Assistant, AssistantOptions};
use spassit_engine::config::Config;
use spassit_engine::pipeline::Observation;
use spassit_engine::plugins::{PluginDrivers, SharedOverlay};
use spassit_engine::presentation::ConsoleOverlay;
use spassit_engine::status::{StatusSurface, StatusView, SurfaceGeometry};

struct QuietSurface;

impl StatusSurface for QuietSurface {
    fn geometry(&self, _label: &str) -> SurfaceGeometry {
        SurfaceGeometry {
            screen_height: 1080,
            surface_height: 145,
        }
    }

    fn show(&mut self, _view: &StatusView) {}

    fn hide(&mut self) {}
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn setup(server_uri: &str, keep_dialog: usize) -> (TempDir, PathBuf, Config) {
    let dir = TempDir::new().unwrap();
    let prompt_path = dir.path().join("prompts.txt");
    fs::write(&prompt_path, "v1 {$functions}").unwrap();

    let mut config = Config::default_config();
    config.llm.url = format!("{}/v1/chat/completions", server_uri);
    config.llm.key = "sk-integration-key".into();
    config.llm.models = vec!["deepseek-chat".to_string(), "qwen-plus".to_string()];
    config.llm.system_prompt = prompt_path.clone();
    config.llm.keep_dialog = keep_dialog;
    config
        .llm
        .payload
        .insert("temperature".to_string(), toml::Value::Float(0.3));
    (dir, prompt_path, config)
}

fn start(config: Config, dir: &TempDir) -> Assistant {
    let overlay: SharedOverlay = std::sync::Arc::new(std::sync::Mutex::new(ConsoleOverlay::default()));
    let mut drivers = PluginDrivers::headless(overlay);
    drivers.desktop_dirs = vec![dir.path().join("Desktop")];
    let options = AssistantOptions {
        drivers: Some(drivers),
        surface: Some(Box::new(QuietSurface)),
        ..Default::default()
    };
    Assistant::start_with(config, None, options).unwrap()
}

fn bodies(requests: &[Request]) -> Vec<serde_json::Value> {
    requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_request_carries_payload_model_and_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-integration-key"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "temperature": 0.3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("你好！")))
        .expect(1)
        .mount(&server)
        .await;

    let (dir, _, config) = setup(&server.uri(), 3);
    let mut assistant = start(config, &dir);

    let outcome = assistant.pipeline().handle_text("你好").await.unwrap();
    assistant.shutdown().unwrap();

    assert_eq!(outcome.reply, "你好！");
    assert_eq!(outcome.observation, Observation::Reply);

    let sent = bodies(&server.received_requests().await.unwrap());
    let messages = sent[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1], json!({"role": "user", "content": "你好"}));
}

#[tokio::test]
async fn test_dialog_window_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&server)
        .await;

    let (dir, _, config) = setup(&server.uri(), 1);
    let mut assistant = start(config, &dir);

    for text in ["一", "二", "三"] {
        assistant.pipeline().handle_text(text).await.unwrap();
    }
    let history: Vec<String> = assistant
        .pipeline()
        .conversation()
        .messages()
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assistant.shutdown().unwrap();

    // System prompt plus one exchange
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], "三");
    assert_eq!(history[2], "ok");

    // The third request saw only the previous exchange and the new message
    let sent = bodies(&server.received_requests().await.unwrap());
    let third = sent[2]["messages"].as_array().unwrap();
    assert_eq!(third.len(), 4);
    assert_eq!(third[1]["content"], "二");
    assert_eq!(third[3]["content"], "三");
}

#[tokio::test]
async fn test_prompt_edit_applies_to_next_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .mount(&server)
        .await;

    let (dir, prompt_path, config) = setup(&server.uri(), 3);
    let mut assistant = start(config, &dir);

    assistant.pipeline().handle_text("first").await.unwrap();

    fs::write(&prompt_path, "v2 {$functions}").unwrap();
    let later = SystemTime::now() + Duration::from_secs(10);
    fs::File::options()
        .write(true)
        .open(&prompt_path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assistant.pipeline().handle_text("second").await.unwrap();
    assistant.shutdown().unwrap();

    let sent = bodies(&server.received_requests().await.unwrap());
    let system_of = |i: usize| sent[i]["messages"][0]["content"].as_str().unwrap().to_string();
    assert!(system_of(0).starts_with("v1 "));
    assert!(system_of(1).starts_with("v2 "));
    assert!(!system_of(1).contains("{$functions}"));
}

#[tokio::test]
async fn test_selected_model_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "qwen-plus" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let (dir, _, config) = setup(&server.uri(), 3);
    let mut assistant = start(config, &dir);

    assistant
        .pipeline()
        .conversation_mut()
        .select_model("qwen-plus")
        .unwrap();
    assistant.pipeline().handle_text("hi").await.unwrap();
    assistant.shutdown().unwrap();
}

#[tokio::test]
async fn test_error_status_is_remote_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let (dir, _, config) = setup(&server.uri(), 3);
    let mut assistant = start(config, &dir);

    let err = assistant.pipeline().handle_text("hi").await.unwrap_err();
    assert!(matches!(err, EngineError::RemoteCall(_)));
    assert_eq!(assistant.pipeline().conversation().messages().len(), 1);

    assistant.shutdown().unwrap();
}

#[tokio::test]
async fn test_tool_call_reply_dispatches_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "好的。\n```json\n{\"function\": \"updateCrosshair\", \"arguments\": {\"size\": 32}}\n```",
        )))
        .mount(&server)
        .await;

    let (dir, _, config) = setup(&server.uri(), 3);
    let mut assistant = start(config, &dir);

    let outcome = assistant.pipeline().handle_text("准星大一点").await.unwrap();
    assistant.shutdown().unwrap();

    match outcome.observation {
        Observation::Invoked { name, output } => {
            assert_eq!(name, "updateCrosshair");
            assert_eq!(output.data["size"], 32);
        }
        other => panic!("Expected Invoked, got {:?}", other),
    }
}
