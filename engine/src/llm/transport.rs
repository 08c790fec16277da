//! Chat completion transport
//!
//! The conversation manager builds the full request body; a transport only
//! delivers it and extracts the assistant text from
//! `choices[0].message.content`.

use async_trait::async_trait;
use std::time::Duration;

use super::{LLMError, Result};
use crate::secrets::SecretString;

/// Upper bound for one model round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Delivers a chat completion request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `body` (already carrying `model` and `messages`) and return the
    /// assistant's reply text
    async fn complete(&self, body: &serde_json::Value) -> Result<String>;
}

/// OpenAI-compatible chat completion endpoint over HTTPS
pub struct HttpChatTransport {
    url: String,
    key: SecretString,
    client: reqwest::Client,
}

impl HttpChatTransport {
    pub fn new(url: impl Into<String>, key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            key,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(&self, body: &serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.key.expose()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                _ => LLMError::InvalidRequest(format!("{}: {}", status, text)),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        extract_reply(&data)
    }
}

/// Pull `choices[0].message.content` out of a completion response
pub fn extract_reply(data: &serde_json::Value) -> Result<String> {
    let choice = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| LLMError::ParseError("No choices in response".to_string()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| LLMError::ParseError("No message in choice".to_string()))?;

    message
        .get("content")
        .and_then(|c| c.as_str())
        .map(String::from)
        .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body() -> serde_json::Value {
        json!({"model": "deepseek-chat", "messages": [{"role": "user", "content": "hi"}]})
    }

    #[test]
    fn test_extract_reply() {
        let data = json!({"choices": [{"message": {"role": "assistant", "content": "你好"}}]});
        assert_eq!(extract_reply(&data).unwrap(), "你好");

        assert!(matches!(
            extract_reply(&json!({"choices": []})),
            Err(LLMError::ParseError(_))
        ));
        assert!(matches!(
            extract_reply(&json!({"choices": [{"message": {"content": null}}]})),
            Err(LLMError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_sends_bearer_and_reads_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpChatTransport::new(
            format!("{}/chat/completions", server.uri()),
            SecretString::new("sk-test"),
        );
        assert_eq!(transport.complete(&body()).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(path("/auth"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        Mock::given(path("/limit"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let at = |p: &str| HttpChatTransport::new(format!("{}{}", server.uri(), p), "k".into());

        assert!(matches!(
            at("/auth").complete(&body()).await,
            Err(LLMError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            at("/limit").complete(&body()).await,
            Err(LLMError::RateLimitExceeded)
        ));
        assert!(matches!(
            at("/broken").complete(&body()).await,
            Err(LLMError::InvalidRequest(_))
        ));
    }
}
