//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Opening chat instructions (first assistant turn)
pub const CHAT_INTRO: &str = include_str!("../../prompts/chat-intro.pmt");

/// Ongoing chat instructions
pub const CHAT_ONGOING: &str = include_str!("../../prompts/chat-ongoing.pmt");

/// Guided exercise step instructions
pub const EXERCISE_STEP: &str = include_str!("../../prompts/exercise-step.pmt");

/// Value reflection instructions
pub const REFLECTION_VALUE: &str = include_str!("../../prompts/reflection-value.pmt");

/// Thinking-pattern reflection instructions
pub const REFLECTION_PATTERN: &str = include_str!("../../prompts/reflection-pattern.pmt");

/// Vision reflection instructions
pub const REFLECTION_VISION: &str = include_str!("../../prompts/reflection-vision.pmt");

/// Summarization register
pub const SUMMARY: &str = include_str!("../../prompts/summary.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "chat-intro" => Some(CHAT_INTRO),
        "chat-ongoing" => Some(CHAT_ONGOING),
        "exercise-step" => Some(EXERCISE_STEP),
        "reflection-value" => Some(REFLECTION_VALUE),
        "reflection-pattern" => Some(REFLECTION_PATTERN),
        "reflection-vision" => Some(REFLECTION_VISION),
        "summary" => Some(SUMMARY),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_chat_variants() {
        assert!(get_embedded("chat-intro").unwrap().contains("first turn"));
        assert!(get_embedded("chat-ongoing").unwrap().contains("sparingly"));
    }

    #[test]
    fn test_get_embedded_exercise_step() {
        let step = get_embedded("exercise-step").unwrap();
        assert!(step.contains("Advancement contract"));
        assert!(step.contains("advance"));
        assert!(step.contains("2 to 4 short suggestions"));
    }

    #[test]
    fn test_get_embedded_reflections() {
        assert!(get_embedded("reflection-value").is_some());
        assert!(get_embedded("reflection-pattern").is_some());
        assert!(get_embedded("reflection-vision").is_some());
    }

    #[test]
    fn test_get_embedded_summary() {
        let summary = get_embedded("summary").unwrap();
        assert!(summary.contains("key_insights"));
        assert!(summary.contains("JSON"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
