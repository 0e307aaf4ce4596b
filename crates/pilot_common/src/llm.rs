//! Reasoning service client.
//!
//! The brain and the conversational handler only ever see the
//! `ReasoningService` trait; the HTTP implementation speaks an
//! Anthropic-style messages API and the fake is scripted for tests. The
//! service returns raw text - extracting structured plans out of it is the
//! parser's job (`plan.rs`), not the client's.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{api_keys, ReasoningSettings};

/// Reasoning service errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning API key not configured")]
    MissingKey,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("reasoning service returned an empty response")]
    Empty,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

/// Narrow async contract for everything the pilot asks the reasoning
/// service: routine completions and the higher-tier weekly analysis.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ReasoningError>;

    /// Higher-stakes analyses go to the analysis-tier model. Implementations
    /// without a second tier may delegate to `complete`.
    async fn complete_analysis(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ReasoningError> {
        self.complete(system, user, max_tokens).await
    }
}

/// HTTP implementation against an Anthropic-style messages endpoint.
pub struct HttpReasoning {
    settings: ReasoningSettings,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpReasoning {
    pub fn new(settings: ReasoningSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let api_key = api_keys::get(api_keys::REASONING);
        Ok(Self { settings, api_key, client })
    }

    pub fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call(&self, model: &str, system: &str, user: &str, max_tokens: u32) -> Result<String, ReasoningError> {
        let api_key = self.api_key.as_deref().ok_or(ReasoningError::MissingKey)?;
        let url = format!("{}/v1/messages", self.settings.endpoint.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout(self.settings.timeout_secs)
                } else {
                    ReasoningError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ReasoningError::Http(format!("HTTP {}", response.status())));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;

        let text = json
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| ReasoningError::InvalidResponse("no text content block".to_string()))?;

        if text.trim().is_empty() {
            return Err(ReasoningError::Empty);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl ReasoningService for HttpReasoning {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, ReasoningError> {
        self.call(&self.settings.model, system, user, max_tokens).await
    }

    async fn complete_analysis(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ReasoningError> {
        self.call(&self.settings.analysis_model, system, user, max_tokens).await
    }
}

/// Scripted fake for tests: returns queued responses in order, repeating the
/// last one once the queue is down to a single entry.
pub struct FakeReasoning {
    responses: Mutex<Vec<Result<String, ReasoningError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeReasoning {
    pub fn new(responses: Vec<Result<String, ReasoningError>>) -> Self {
        Self { responses: Mutex::new(responses), calls: Mutex::new(Vec::new()) }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn always_error(error: ReasoningError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// (system, user) prompts of every call made, for assertions.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningService for FakeReasoning {
    async fn complete(&self, system: &str, user: &str, _max_tokens: u32) -> Result<String, ReasoningError> {
        self.calls.lock().unwrap().push((system.to_string(), user.to_string()));

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ReasoningError::Empty);
        }
        if responses.len() == 1 {
            responses[0].clone()
        } else {
            responses.remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_returns_in_order_then_repeats() {
        let fake = FakeReasoning::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
        ]);
        assert_eq!(fake.complete("s", "u", 100).await.unwrap(), "first");
        assert_eq!(fake.complete("s", "u", 100).await.unwrap(), "second");
        assert_eq!(fake.complete("s", "u", 100).await.unwrap(), "second");
        assert_eq!(fake.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fake_error() {
        let fake = FakeReasoning::always_error(ReasoningError::Timeout(120));
        let err = fake.complete("s", "u", 100).await.unwrap_err();
        assert!(matches!(err, ReasoningError::Timeout(120)));
    }

    #[tokio::test]
    async fn test_fake_records_prompts() {
        let fake = FakeReasoning::always("ok");
        let _ = fake.complete("le systeme", "la question", 100).await;
        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "le systeme");
        assert_eq!(calls[0].1, "la question");
    }

    #[tokio::test]
    async fn test_http_without_key_is_typed_error() {
        // No ANTHROPIC_API_KEY in the test environment
        std::env::remove_var(crate::config::api_keys::REASONING);
        let client = HttpReasoning::new(ReasoningSettings::default()).unwrap();
        assert!(!client.configured());
        let err = client.complete("s", "u", 10).await.unwrap_err();
        assert!(matches!(err, ReasoningError::MissingKey));
    }
}
