//! Claude messages-API provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::extract::provider::{ModelError, ModelProvider};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 4096;
const DEFAULT_TRANSPORT_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 1000;

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    api_url: String,
    transport_retries: u32,
}

impl ClaudeClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            transport_retries: DEFAULT_TRANSPORT_RETRIES,
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Override the endpoint, mainly for tests against a local mock server.
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = url;
        self
    }

    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.transport_retries = retries;
        self
    }

    /// One request attempt with no retry.
    async fn post_once(&self, prompt: &str) -> Result<String, ModelError> {
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let resp = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let parsed: MessagesResponse = resp.json().await.map_err(|e| {
                ModelError::InvalidResponse(format!("malformed response body: {}", e))
            })?;
            match parsed.content.first() {
                Some(block) => Ok(block.text.clone()),
                None => Err(ModelError::InvalidResponse(
                    "empty content array in response".to_string(),
                )),
            }
        } else if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            Err(ModelError::RateLimited { retry_after })
        } else {
            let message = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            Err(ModelError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn is_transient(error: &ModelError) -> bool {
        match error {
            ModelError::Http(_) | ModelError::RateLimited { .. } => true,
            ModelError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
impl ModelProvider for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    /// Sends the prompt, retrying the identical request with exponential
    /// backoff on transport-level failures.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        if self.api_key.is_empty() {
            return Err(ModelError::MissingApiKey);
        }

        let mut delay_ms = INITIAL_RETRY_DELAY_MS;
        let mut attempt = 0;
        loop {
            match self.post_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if Self::is_transient(&e) && attempt < self.transport_retries => {
                    attempt += 1;
                    let wait = match &e {
                        ModelError::RateLimited { retry_after } => {
                            Duration::from_secs(*retry_after)
                        }
                        _ => Duration::from_millis(delay_ms),
                    };
                    tracing::warn!(
                        "model request failed: {} - retrying in {:?} (attempt {}/{})",
                        e,
                        wait,
                        attempt,
                        self.transport_retries
                    );
                    sleep(wait).await;
                    delay_ms *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    /// Minimal HTTP stub: serves the scripted (status, body) pairs, one
    /// connection each, then stops accepting.
    fn serve_responses(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("local addr");
        thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                read_request(&mut stream);
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Service Unavailable" },
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]);
            let content_length = headers
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                return;
            }
        }
    }

    fn message_body(text: &str) -> String {
        serde_json::json!({"content": [{"text": text}]}).to_string()
    }

    #[tokio::test]
    async fn transient_failure_retries_identical_request_then_succeeds() {
        let url = serve_responses(vec![(503, String::new()), (200, message_body("[]"))]);
        let client = ClaudeClient::new("test-key".to_string())
            .with_api_url(url)
            .with_transport_retries(1);

        let text = client.complete("prompt").await.expect("second attempt");
        assert_eq!(text, "[]");
    }

    #[tokio::test]
    async fn exhausted_transport_retries_surface_the_error() {
        let url = serve_responses(vec![(503, String::new()), (503, String::new())]);
        let client = ClaudeClient::new("test-key".to_string())
            .with_api_url(url)
            .with_transport_retries(1);

        let err = client.complete("prompt").await.unwrap_err();
        match err {
            ModelError::Api { status, .. } => assert_eq!(status, 503),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_transient_status_fails_without_retry() {
        // One scripted response only: a retry would hang on a second accept.
        let url = serve_responses(vec![(400, String::new())]);
        let client = ClaudeClient::new("test-key".to_string())
            .with_api_url(url)
            .with_transport_retries(3);

        let err = client.complete("prompt").await.unwrap_err();
        match err {
            ModelError::Api { status, .. } => assert_eq!(status, 400),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_key_fails_without_network() {
        let client = ClaudeClient::new(String::new());
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, ModelError::MissingApiKey));
    }

    #[test]
    fn transient_classification() {
        assert!(ClaudeClient::is_transient(&ModelError::RateLimited {
            retry_after: 1
        }));
        assert!(ClaudeClient::is_transient(&ModelError::Api {
            status: 503,
            message: String::new()
        }));
        assert!(!ClaudeClient::is_transient(&ModelError::Api {
            status: 400,
            message: String::new()
        }));
        assert!(!ClaudeClient::is_transient(&ModelError::MissingApiKey));
    }
}
