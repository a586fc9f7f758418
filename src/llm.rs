use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Classification of a failed backend call. The resolver's fallback logic is
/// driven exactly by this taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Quota or rate-limit rejection. Qualifies for fallback.
    RateLimited,
    /// Network trouble, 5xx, timeout. Qualifies for fallback.
    Transient,
    /// Invalid or rejected credential. No fallback helps; the session ends.
    FatalAuth,
}

#[derive(Debug, Clone, Error)]
#[error("backend failure ({kind:?}): {message}")]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// One call to a selectable LLM backend, given an assembled prompt.
///
/// Implementations classify their own failures; the session never inspects
/// transport details.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendFailure>;
}

/// OpenAI-compatible chat-completions backend over HTTP.
///
/// Configuration is passed in explicitly; the core never reads environment
/// variables (the external credential loader owns those).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, BackendFailure> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| {
                BackendFailure::new(FailureKind::Transient, format!("http client init: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> BackendFailure {
        let kind = match status.as_u16() {
            429 => FailureKind::RateLimited,
            401 | 403 => FailureKind::FatalAuth,
            _ => FailureKind::Transient,
        };
        let snippet: String = body.chars().take(200).collect();
        BackendFailure::new(kind, format!("HTTP {}: {}", status, snippet))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, BackendFailure> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.map_err(|e| {
            BackendFailure::new(FailureKind::Transient, format!("request failed: {e}"))
        })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendFailure::new(FailureKind::Transient, format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, &text));
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| BackendFailure::new(FailureKind::Transient, format!("parse JSON: {e}")))?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string();

        debug!(model, response_len = content.len(), "backend call complete");
        Ok(content)
    }
}
