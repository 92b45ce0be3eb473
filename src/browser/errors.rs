//! Browser error types

use thiserror::Error;

/// Browser-related errors.
///
/// `LaunchFailed`, `CloseFailed` and `ConnectionLost` are fatal to the owning
/// session; everything else is recoverable at the cycle boundary.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to close browsing context: {0}")]
    CloseFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("JavaScript error: {0}")]
    JavaScriptError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BrowserError {
    /// Whether this error ends the session rather than just the current
    /// cycle. Once the CDP handler stream is gone every subsequent call
    /// fails, so `ConnectionLost` is terminal alongside the lifecycle errors.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            BrowserError::LaunchFailed(_)
                | BrowserError::CloseFailed(_)
                | BrowserError::ConnectionLost(_)
        )
    }
}
