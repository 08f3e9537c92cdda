//! Persisted record types
//!
//! These are the only structures the engine reads and writes through the
//! store; ordering of the message log is the only persisted structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Typed by the user
    User,
    /// Generated by the completion service
    Assistant,
    /// System-authored framing (step banners, mood gates, quota notices)
    Notice,
    /// The opening greeting of a fresh session
    Welcome,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Notice => write!(f, "notice"),
            Self::Welcome => write!(f, "welcome"),
        }
    }
}

/// One message in the session log. Append-only once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (uuid v7, time-ordered)
    pub id: String,

    /// Author role
    pub role: MessageRole,

    /// Message body
    pub text: String,

    /// Optional display title (e.g. "Step 2/4: Noticing the breath")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Exercise tag when this message belongs to a guided exercise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            text: text.into(),
            title: None,
            exercise: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self::with_role(MessageRole::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self::with_role(MessageRole::Assistant, text)
    }

    /// Create a notice message
    pub fn notice(text: impl Into<String>) -> Self {
        debug!("Message::notice: called");
        Self::with_role(MessageRole::Notice, text)
    }

    /// Create a welcome message
    pub fn welcome(text: impl Into<String>) -> Self {
        debug!("Message::welcome: called");
        Self::with_role(MessageRole::Welcome, text)
    }

    /// Attach a display title
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Tag this message as part of a guided exercise
    pub fn tagged(mut self, exercise: impl Into<String>) -> Self {
        self.exercise = Some(exercise.into());
        self
    }
}

/// The persisted daily request counter and its quota
///
/// Invariant: any read/write first compares `date_key` to today and resets
/// `count` before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Calendar date the counter belongs to ("YYYY-MM-DD")
    pub date_key: String,

    /// Successful completion requests recorded for that date
    pub count: u32,

    /// Daily quota in effect when the record was last written
    pub limit: u32,
}

impl RateLimitRecord {
    /// Fresh record for the given date with a zero count
    pub fn fresh(date_key: impl Into<String>, limit: u32) -> Self {
        debug!(%limit, "RateLimitRecord::fresh: called");
        Self {
            date_key: date_key.into(),
            count: 0,
            limit,
        }
    }
}

/// A recurring thought pattern extracted from a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtPattern {
    /// The thought as the user expressed it
    pub original_thought: String,

    /// Cognitive distortion labels the extractor assigned
    pub distortions: Vec<String>,

    /// A balanced restatement of the thought
    pub reframed_thought: String,

    /// Extractor confidence in [0.0, 1.0]
    pub confidence: f64,

    /// Session the pattern was extracted from
    pub session_id: String,

    /// Extraction timestamp
    pub timestamp: DateTime<Utc>,
}

/// Structured recap produced by a dedicated summarization round-trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryArtifact {
    /// Short narrative summary
    pub summary: String,

    /// Bullet-point insights
    pub key_insights: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text, "Hello");
        assert!(msg.title.is_none());
        assert!(msg.exercise.is_none());
    }

    #[test]
    fn test_message_titled_and_tagged() {
        let msg = Message::notice("Step 2/4: Noticing the breath")
            .titled("Step 2/4: Noticing the breath")
            .tagged("breathing");
        assert_eq!(msg.role, MessageRole::Notice);
        assert_eq!(msg.title.as_deref(), Some("Step 2/4: Noticing the breath"));
        assert_eq!(msg.exercise.as_deref(), Some("breathing"));
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::assistant("How did that feel?");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.role, MessageRole::Assistant);
        assert_eq!(back.text, "How did that feel?");
    }

    #[test]
    fn test_rate_limit_record_fresh() {
        let record = RateLimitRecord::fresh("2025-03-14", 10);
        assert_eq!(record.date_key, "2025-03-14");
        assert_eq!(record.count, 0);
        assert_eq!(record.limit, 10);
    }

    #[test]
    fn test_message_ids_are_time_ordered() {
        let a = Message::user("first");
        let b = Message::user("second");
        // uuid v7 sorts lexicographically by creation time
        assert!(a.id <= b.id);
    }
}
