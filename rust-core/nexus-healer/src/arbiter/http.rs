// SPDX-License-Identifier: PMPL-1.0-or-later

//! Arbiter backed by an OpenAI-compatible chat-completions endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Arbiter, ArbiterError, ArbitrationRequest, SYSTEM_PROMPT};
use crate::decision::ArbiterDecision;

/// Connection settings for [`HttpArbiter`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Base URL, `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.1,
        }
    }
}

impl fmt::Debug for ArbiterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArbiterConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ArbiterConfig {
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Language-model arbiter over HTTP.
///
/// A timeout or transport failure is returned as an [`ArbiterError`]; the
/// engine turns it into a degraded decision. A reply whose message content is
/// not a usable verdict is returned as a degraded decision directly, keeping
/// the reported token usage.
pub struct HttpArbiter {
    client: reqwest::Client,
    config: ArbiterConfig,
}

impl HttpArbiter {
    pub fn new(config: ArbiterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    fn request_body(&self, request: &ArbitrationRequest) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.render_prompt() },
            ],
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
        })
    }

    async fn call(&self, body: &Value) -> Result<Value, ArbiterError> {
        let mut builder = self.client.post(self.config.endpoint()).json(body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ArbiterError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ArbiterError::Status { status, body });
        }

        resp.json()
            .await
            .map_err(|e| ArbiterError::Malformed(e.to_string()))
    }
}

/// Extract the verdict from a chat-completions payload.
pub(crate) fn decision_from_completion(payload: &Value) -> ArbiterDecision {
    let tokens = payload["usage"]["total_tokens"].as_u64().unwrap_or(0);
    match payload["choices"][0]["message"]["content"].as_str() {
        Some(content) => {
            let decision = ArbiterDecision::from_text(content);
            decision.with_tokens(tokens)
        }
        None => ArbiterDecision::degraded("completion has no message content").with_tokens(tokens),
    }
}

#[async_trait]
impl Arbiter for HttpArbiter {
    fn name(&self) -> &str {
        "http-chat-completions"
    }

    async fn arbitrate(&self, request: &ArbitrationRequest) -> Result<ArbiterDecision, ArbiterError> {
        let body = self.request_body(request);
        let timeout = self.config.timeout();

        match tokio::time::timeout(timeout, self.call(&body)).await {
            Ok(Ok(payload)) => {
                let decision = decision_from_completion(&payload);
                debug!(
                    conflict_id = %request.conflict.conflict_id,
                    confidence = decision.confidence,
                    tokens = decision.tokens_used,
                    "Arbiter responded"
                );
                Ok(decision)
            }
            Ok(Err(e)) => {
                warn!(conflict_id = %request.conflict.conflict_id, error = %e, "Arbiter call failed");
                Err(e)
            }
            Err(_) => {
                warn!(conflict_id = %request.conflict.conflict_id, ?timeout, "Arbiter call timed out");
                Err(ArbiterError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::test_support::two_edge_conflict;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response after reading the full request.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn arbiter(base_url: String, timeout_secs: u64) -> HttpArbiter {
        HttpArbiter::new(ArbiterConfig {
            base_url,
            api_key: Some("test-key".into()),
            timeout_secs,
            ..Default::default()
        })
    }

    #[test]
    fn test_completion_parsing() {
        let payload = json!({
            "choices": [{ "message": { "content":
                "{\"correct_relationship_id\":\"rel-b\",\"confidence\":0.9,\"outdated_relationship_ids\":[\"rel-a\"]}"
            }}],
            "usage": { "total_tokens": 640 }
        });
        let decision = decision_from_completion(&payload);
        assert_eq!(decision.tokens_used, 640);
        assert_eq!(decision.correct_relationship_id.unwrap().as_str(), "rel-b");

        let empty = decision_from_completion(&json!({ "usage": { "total_tokens": 12 } }));
        assert!(empty.is_error());
        assert_eq!(empty.tokens_used, 12);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ArbiterConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert_eq!(config.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let content = json!({
            "correct_relationship_id": "rel-b",
            "confidence": 0.92,
            "outdated_relationship_ids": ["rel-a"],
            "reasoning": "newer press release"
        })
        .to_string();
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "total_tokens": 777 }
        })
        .to_string();
        let base = serve_once("200 OK", body).await;

        let request = ArbitrationRequest::new(two_edge_conflict(), vec!["doc".into(), "doc".into()]);
        let decision = arbiter(base, 5).arbitrate(&request).await.unwrap();
        assert!(!decision.is_error());
        assert_eq!(decision.tokens_used, 777);
        assert_eq!(decision.outdated_relationship_ids.len(), 1);
    }

    #[tokio::test]
    async fn test_http_error_status_is_reported() {
        let base = serve_once("500 Internal Server Error", "{\"error\":\"boom\"}".into()).await;
        let request = ArbitrationRequest::new(two_edge_conflict(), Vec::new());
        let err = arbiter(base, 5).arbitrate(&request).await.unwrap_err();
        assert!(matches!(err, ArbiterError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let request = ArbitrationRequest::new(two_edge_conflict(), Vec::new());
        let err = arbiter(format!("http://{addr}"), 1)
            .arbitrate(&request)
            .await
            .unwrap_err();
        assert_eq!(err, ArbiterError::Timeout(Duration::from_secs(1)));
    }
}
