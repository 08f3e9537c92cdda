//! Completion error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during completion round-trips
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Rate limited by service, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompletionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::RateLimited { .. } => true,
            CompletionError::ApiError { status, .. } => *status >= 500,
            CompletionError::Network(_) => true,
            CompletionError::InvalidResponse(_) => false,
            CompletionError::Json(_) => false,
        }
    }

    /// Get the retry duration if the service rate-limited us
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CompletionError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
