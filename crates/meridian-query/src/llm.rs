//! Completion backend for the assisted translation path.
//!
//! The translator only sees the `CompletionBackend` trait; production wires
//! in an OpenAI-compatible chat-completions client, tests wire in a canned
//! fake. Every call carries both the configured timeout and the remaining
//! per-request deadline; whichever is shorter wins.

use std::time::Duration;

use async_trait::async_trait;

use meridian_core::config::LlmSettings;
use meridian_core::Deadline;

use crate::error::TranslationError;

/// One-shot text completion, constrained by the prompt to emit a single
/// JSON object.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, deadline: Deadline)
        -> Result<String, TranslationError>;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpCompletionBackend {
    pub fn new(settings: &LlmSettings) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| TranslationError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(
        &self,
        prompt: &str,
        deadline: Deadline,
    ) -> Result<String, TranslationError> {
        let budget = self.timeout.min(deadline.remaining());
        if budget.is_zero() {
            return Err(TranslationError::Timeout);
        }

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslationError::Timeout
                } else {
                    TranslationError::Backend(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| TranslationError::Backend(e.to_string()))?;

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranslationError::MalformedResponse(e.to_string()))?;

        payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                TranslationError::MalformedResponse(
                    "completion payload missing choices[0].message.content".to_string(),
                )
            })
    }
}
