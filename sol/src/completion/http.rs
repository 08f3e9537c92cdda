//! HTTP completion client implementation
//!
//! Talks to the Solace completion endpoint: one POST per turn, structured
//! reply envelope back. Transient failures are retried with exponential
//! backoff before surfacing as errors.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CompletionClient, CompletionError, CompletionReply, CompletionRequest};
use crate::config::CompletionConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Completion client for the Solace backend
pub struct HttpCompletionClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl HttpCompletionClient {
    /// Create a new client from configuration
    ///
    /// Reads the API key from the environment variable named in config.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| CompletionError::InvalidResponse(format!("{} is not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(CompletionError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/session/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError> {
        debug!(message_count = %request.messages.len(), "complete: called");
        let url = self.endpoint();

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(
                    attempt,
                    backoff_ms = backoff,
                    "complete: retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match self
                .http
                .post(url.clone())
                .bearer_auth(self.api_key.clone())
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "complete: network error");
                    last_error = Some(CompletionError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                debug!("complete: rate limited (429)");
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(CompletionError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "complete: retryable error");
                last_error = Some(CompletionError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "complete: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(CompletionError::ApiError { status, message: text });
            }

            debug!("complete: success");
            let reply: CompletionReply = response.json().await?;
            return Ok(reply);
        }

        Err(last_error.unwrap_or_else(|| CompletionError::InvalidResponse("Max retries exceeded".to_string())))
    }
}
