//! Completion request/response types
//!
//! These model the Solace completion endpoint: an ordered role/content list
//! in, a structured reply envelope out. The envelope carries everything the
//! engines key off: the reply text, short direct-reply suggestions, and the
//! per-turn advancement signal for guided exercises.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Role of one prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a completion request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        debug!("ChatMessage::system: called");
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        debug!("ChatMessage::user: called");
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        debug!("ChatMessage::assistant: called");
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request - everything needed for one round-trip
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// Ordered prompt: system instructions first, then bounded history
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        debug!(message_count = %messages.len(), "CompletionRequest::new: called");
        Self { messages }
    }
}

/// Reply envelope from the completion endpoint
///
/// `success=false` is a model rejection: callers must route to the canned
/// fallback, never render `error` to the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionReply {
    /// Whether the service produced a usable reply
    pub success: bool,

    /// Reply text when successful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// 2-4 short direct-reply suggestions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    /// Exercise advancement signal: true = ready for the next step.
    /// Absent outside exercise turns; unverified, so callers clamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advance: Option<bool>,

    /// Service-side error description (diagnostic only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionReply {
    /// A successful reply with the given text
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A successful reply carrying an advancement signal
    pub fn with_advance(message: impl Into<String>, advance: bool) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            advance: Some(advance),
            ..Default::default()
        }
    }

    /// A rejection envelope
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attach suggestions
    pub fn suggesting(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Reply text, empty when missing
    pub fn text_or_empty(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }
}

/// Fixed, non-model-authored message shown when the completion service fails
pub const FALLBACK_TEXT: &str =
    "I'm having trouble finding my words right now. Give me a moment, then let's try that again.";

/// Canned fallback message for a failed round-trip
pub fn fallback_text() -> String {
    debug!("fallback_text: called");
    FALLBACK_TEXT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::system("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"system""#));
    }

    #[test]
    fn test_reply_envelope_deserializes_sparse() {
        // The endpoint omits absent fields entirely
        let reply: CompletionReply = serde_json::from_str(r#"{"success":true,"message":"hi"}"#).unwrap();
        assert!(reply.success);
        assert_eq!(reply.message.as_deref(), Some("hi"));
        assert!(reply.suggestions.is_empty());
        assert!(reply.advance.is_none());
    }

    #[test]
    fn test_reply_envelope_with_advance() {
        let reply: CompletionReply =
            serde_json::from_str(r#"{"success":true,"message":"go on","advance":false,"suggestions":["I felt tense"]}"#)
                .unwrap();
        assert_eq!(reply.advance, Some(false));
        assert_eq!(reply.suggestions.len(), 1);
    }

    #[test]
    fn test_rejected_reply() {
        let reply = CompletionReply::rejected("content filter");
        assert!(!reply.success);
        assert!(reply.message.is_none());
        assert_eq!(reply.error.as_deref(), Some("content filter"));
    }

    #[test]
    fn test_fallback_is_fixed() {
        assert_eq!(fallback_text(), FALLBACK_TEXT);
    }
}
