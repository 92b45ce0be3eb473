//! Ollama-backed decision oracle.

use std::time::Duration;

use tracing::debug;

use super::{DecisionOracle, OracleError};

/// Shared Ollama client. One instance serves the whole fleet; reqwest
/// multiplexes concurrent requests without blocking the runtime.
pub struct OllamaOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaOracle {
    /// Create a client for the given Ollama host and model.
    pub fn new(host: &str, model: &str) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| OracleError::Request(format!("Failed to create client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", host.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl DecisionOracle for OllamaOracle {
    async fn consult(&self, situation: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": situation,
            "stream": false,
            "options": { "temperature": 0.7 },
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(OracleError::Request(format!("HTTP {}", response.status())));
        }

        let data: serde_json::Value = response.json().await?;

        let text = data
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| OracleError::Malformed("no response field".into()))?;

        debug!("Oracle returned {} chars", text.len());
        Ok(text.to_string())
    }
}
