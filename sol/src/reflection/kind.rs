//! Reflection kind descriptors
//!
//! The three reflection variants share one state machine; everything
//! kind-specific lives here: the opening/turn template, the payload fed to
//! it, the summarization purpose line, and the save destination slug.

use serde_json::{Value, json};
use tracing::debug;

/// Kind tag plus kind-specific payload for one reflection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionKind {
    /// Open-ended exploration of a personal value
    Value { value: String },

    /// Examination of a recurring thinking pattern
    ThinkingPattern {
        original_thought: String,
        reframed_thought: Option<String>,
    },

    /// Painting a concrete vision of the future
    Vision { area: String },
}

impl ReflectionKind {
    /// Stable slug, also the save destination directory name
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Value { .. } => "value",
            Self::ThinkingPattern { .. } => "thinking-pattern",
            Self::Vision { .. } => "vision",
        }
    }

    /// Template used for opening and turn contexts
    pub fn template_name(&self) -> &'static str {
        debug!(slug = %self.slug(), "ReflectionKind::template_name: called");
        match self {
            Self::Value { .. } => "reflection-value",
            Self::ThinkingPattern { .. } => "reflection-pattern",
            Self::Vision { .. } => "reflection-vision",
        }
    }

    /// Payload rendered into the turn template
    pub fn payload(&self) -> Value {
        match self {
            Self::Value { value } => json!({ "value": value }),
            Self::ThinkingPattern {
                original_thought,
                reframed_thought,
            } => json!({
                "original_thought": original_thought,
                "reframed_thought": reframed_thought,
            }),
            Self::Vision { area } => json!({ "area": area }),
        }
    }

    /// Purpose line for the summarization register
    pub fn summary_purpose(&self) -> &'static str {
        match self {
            Self::Value { .. } => "reflection on a personal value",
            Self::ThinkingPattern { .. } => "reflection on a recurring thinking pattern",
            Self::Vision { .. } => "reflection on a vision of the future",
        }
    }
}

impl std::fmt::Display for ReflectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}
