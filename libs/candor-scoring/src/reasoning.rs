//! Client for the external reasoning service
//!
//! Contract: `POST {endpoint}` with `{"model": ..., "prompt": ...}` and an
//! optional bearer token; the service answers `{"text": ...}`. Anything
//! else is a [`ReasoningError`] and the caller falls back to the rules.

use crate::error::ReasoningError;
use async_trait::async_trait;
use candor_common::config::ReasoningConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ReasoningClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ReasoningError>;
}

/// Used when no endpoint is configured; every call goes to the fallback
pub struct DisabledReasoning;

#[async_trait]
impl ReasoningClient for DisabledReasoning {
    async fn generate(&self, _prompt: &str) -> Result<String, ReasoningError> {
        Err(ReasoningError::Disabled)
    }
}

#[derive(Clone)]
pub struct HttpReasoningClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpReasoningClient {
    pub fn new(endpoint: impl Into<String>, config: &ReasoningConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn call(&self, prompt: &str) -> Result<String, ReasoningError> {
        let mut req = self
            .agent
            .request("POST", &self.endpoint)
            .set("content-type", "application/json");
        if let Some(token) = &self.api_key {
            req = req.set("authorization", &format!("Bearer {token}"));
        }

        let body = json!({ "model": self.model, "prompt": prompt });
        let response = match req.send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(ReasoningError::Status(code)),
            Err(ureq::Error::Transport(err)) => return Err(ReasoningError::Transport(err.to_string())),
        };

        let payload: Value = response
            .into_json()
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        extract_text(&payload)
    }
}

fn extract_text(payload: &Value) -> Result<String, ReasoningError> {
    payload
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReasoningError::Malformed("response has no text field".to_string()))
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn generate(&self, prompt: &str) -> Result<String, ReasoningError> {
        // ureq blocks; keep it off the runtime threads
        let client = self.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || client.call(&prompt))
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?
    }
}

/// Client selected by configuration
pub fn reasoning_client(config: &ReasoningConfig) -> Arc<dyn ReasoningClient> {
    match &config.endpoint {
        Some(endpoint) => Arc::new(HttpReasoningClient::new(endpoint.clone(), config)),
        None => Arc::new(DisabledReasoning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> ReasoningConfig {
        ReasoningConfig {
            endpoint: endpoint.map(str::to_string),
            api_key: None,
            model: "default".to_string(),
            timeout_ms: 500,
        }
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(&json!({"text": " [VERDICT]: HIRE "})).unwrap(), "[VERDICT]: HIRE");
        assert!(matches!(extract_text(&json!({"text": ""})), Err(ReasoningError::Malformed(_))));
        assert!(matches!(extract_text(&json!({"output": "x"})), Err(ReasoningError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_disabled_without_endpoint() {
        let client = reasoning_client(&config(None));
        assert!(matches!(client.generate("p").await, Err(ReasoningError::Disabled)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 9 (discard) on loopback is closed in test environments
        let client = reasoning_client(&config(Some("http://127.0.0.1:9/generate")));
        assert!(matches!(client.generate("p").await, Err(ReasoningError::Transport(_))));
    }
}
