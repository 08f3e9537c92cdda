//! Insight extraction endpoint client
//!
//! One POST per finished session: the transcript goes out, recurring
//! thought patterns come back. Strictly best-effort; callers must treat
//! every failure as silent.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use mindstore::ThoughtPattern;

use crate::config::CompletionConfig;

/// Errors from the extraction endpoint
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Extraction rejected: {0}")]
    Rejected(String),
}

/// One transcript line sent to the extraction endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub role: String,
    pub content: String,
}

/// Extraction request payload
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    pub messages: Vec<TranscriptLine>,

    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// One pattern as the endpoint returns it
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedPattern {
    #[serde(rename = "originalThought")]
    pub original_thought: String,

    #[serde(default)]
    pub distortions: Vec<String>,

    #[serde(rename = "reframedThought")]
    pub reframed_thought: String,

    pub confidence: f64,
}

impl ExtractedPattern {
    /// Convert to the persisted form, stamping provenance
    pub fn into_thought_pattern(self, session_id: &str) -> ThoughtPattern {
        ThoughtPattern {
            original_thought: self.original_thought,
            distortions: self.distortions,
            reframed_thought: self.reframed_thought,
            confidence: self.confidence,
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Extraction response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionReply {
    pub success: bool,

    #[serde(default)]
    pub patterns: Vec<ExtractedPattern>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Client for the insight extraction endpoint
#[async_trait]
pub trait InsightClient: Send + Sync {
    /// Run one extraction round-trip
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionReply, InsightError>;
}

/// HTTP implementation against the Solace backend
pub struct HttpInsightClient {
    api_key: String,
    base_url: String,
    http: Client,
}

impl HttpInsightClient {
    /// Create a new client from configuration
    pub fn from_config(config: &CompletionConfig) -> Result<Self, InsightError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| InsightError::Rejected(format!("{} is not set", config.api_key_env)))?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(InsightError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            http,
        })
    }
}

#[async_trait]
impl InsightClient for HttpInsightClient {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionReply, InsightError> {
        debug!(session_id = %request.session_id, message_count = %request.messages.len(), "extract: called");
        let url = format!("{}/v1/insights/extract", self.base_url);

        let response = self
            .http
            .post(url)
            .bearer_auth(self.api_key.clone())
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(%status, "extract: API error");
            return Err(InsightError::ApiError { status, message: text });
        }

        let reply: ExtractionReply = response.json().await?;
        debug!(success = reply.success, pattern_count = reply.patterns.len(), "extract: done");
        Ok(reply)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock extraction client for unit tests
    pub struct MockInsightClient {
        reply: Mutex<Option<Result<ExtractionReply, String>>>,
        call_count: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockInsightClient {
        pub fn returning(reply: ExtractionReply) -> Self {
            Self {
                reply: Mutex::new(Some(Ok(reply))),
                call_count: AtomicUsize::new(0),
                delay: None,
            }
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                reply: Mutex::new(Some(Err(message.into()))),
                call_count: AtomicUsize::new(0),
                delay: None,
            }
        }

        /// Delay each call, to widen concurrency windows in tests
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InsightClient for MockInsightClient {
        async fn extract(&self, _request: ExtractionRequest) -> Result<ExtractionReply, InsightError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.reply.lock().unwrap().clone() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(InsightError::Rejected(message)),
                None => Ok(ExtractionReply {
                    success: true,
                    patterns: vec![],
                    error: None,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_request_wire_format() {
        let request = ExtractionRequest {
            messages: vec![TranscriptLine {
                role: "user".to_string(),
                content: "I always mess things up".to_string(),
            }],
            session_id: "sess-1".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""sessionId":"sess-1""#));
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn test_extraction_reply_wire_format() {
        let json = r#"{
            "success": true,
            "patterns": [{
                "originalThought": "I always mess things up",
                "distortions": ["overgeneralization"],
                "reframedThought": "One mistake is not a pattern",
                "confidence": 0.9
            }]
        }"#;

        let reply: ExtractionReply = serde_json::from_str(json).unwrap();
        assert!(reply.success);
        assert_eq!(reply.patterns.len(), 1);
        assert_eq!(reply.patterns[0].original_thought, "I always mess things up");
    }

    #[test]
    fn test_into_thought_pattern_stamps_provenance() {
        let pattern = ExtractedPattern {
            original_thought: "t".to_string(),
            distortions: vec![],
            reframed_thought: "r".to_string(),
            confidence: 0.7,
        };

        let stored = pattern.into_thought_pattern("sess-42");
        assert_eq!(stored.session_id, "sess-42");
        assert_eq!(stored.confidence, 0.7);
    }
}
