//! Decision oracle collaborator.
//!
//! Sessions hand the oracle a textual situation description and get free
//! text back; the caller parses it defensively (see [`crate::agent::decision`]).
//! Any failure here is cycle-local: the consulting session skips the cycle
//! and continues.

mod ollama;

pub use ollama::OllamaOracle;

use async_trait::async_trait;
use thiserror::Error;

/// Oracle invocation errors. Always recoverable at the cycle boundary.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Request(String),

    #[error("Oracle response malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Request(err.to_string())
    }
}

/// External source of next-action guidance, shared by all sessions.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Submit a situation description, get free-text guidance back.
    /// No structure is guaranteed in the response.
    async fn consult(&self, situation: &str) -> Result<String, OracleError>;
}
