//! ContextAssembler - bounded prompt payloads from session history
//!
//! Every completion round-trip goes through here. Each register (plain
//! chat, exercise step, reflection, summarization) gets its own system
//! instructions and its own history window; the registers are never mixed
//! in one payload.

use eyre::Result;
use serde_json::json;
use tracing::debug;

use mindstore::{Message, MessageRole, SummaryArtifact};

use crate::completion::ChatMessage;
use crate::config::{ContextConfig, ProfileConfig};
use crate::exercise::ExerciseFlowDefinition;
use crate::prompts::PromptLoader;
use crate::reflection::ReflectionKind;

/// Builds bounded prompt payloads from session history
#[derive(Clone)]
pub struct ContextAssembler {
    loader: PromptLoader,
    config: ContextConfig,
    profile: ProfileConfig,
}

impl ContextAssembler {
    /// Create an assembler with the given loader and configuration
    pub fn new(loader: PromptLoader, config: ContextConfig, profile: ProfileConfig) -> Self {
        debug!(
            chat_window = config.chat_window_exchanges,
            step_window = config.step_window_exchanges,
            "ContextAssembler::new: called"
        );
        Self {
            loader,
            config,
            profile,
        }
    }

    /// Assemble the plain-chat payload: personalized system instructions
    /// followed by the bounded conversation history
    ///
    /// Switches between the introduction variant (no assistant turn yet)
    /// and the ongoing variant. Exercise narration and notices are
    /// excluded; they belong to a different register.
    pub fn assemble_chat_context(&self, recent: &[Message]) -> Result<Vec<ChatMessage>> {
        debug!(recent_count = recent.len(), "assemble_chat_context: called");
        let first_assistant_turn = !recent.iter().any(|m| m.role == MessageRole::Assistant);

        let template = if first_assistant_turn { "chat-intro" } else { "chat-ongoing" };
        let system = self.loader.render(
            template,
            &json!({
                "has_name": self.profile.name.is_some(),
                "name": self.profile.name,
            }),
        )?;

        let mut payload = vec![ChatMessage::system(system)];
        payload.extend(self.history_window(recent, self.config.chat_window_exchanges * 2, false));
        Ok(payload)
    }

    /// Assemble the exercise-step payload
    ///
    /// System instructions state the current step and total, the step's
    /// therapeutic goal, the initial-vs-deepening variant, the advancement
    /// contract, and the suggestion directive. A smaller recent-turn
    /// window follows verbatim.
    pub fn assemble_exercise_step_context(
        &self,
        recent: &[Message],
        flow: &ExerciseFlowDefinition,
        step_index: usize,
        first_turn_in_step: bool,
    ) -> Result<Vec<ChatMessage>> {
        debug!(
            flow = flow.name,
            step_index, first_turn_in_step, "assemble_exercise_step_context: called"
        );
        let step = flow.step(step_index);
        let step_number = step_index.min(flow.step_count() - 1) + 1;

        let system = self.loader.render(
            "exercise-step",
            &json!({
                "flow_name": flow.name,
                "step_number": step_number,
                "step_total": flow.step_count(),
                "step_title": step.title,
                "goal": step.goal,
                "first_turn": first_turn_in_step,
                "initial_instructions": step.initial_instructions,
                "deepening_instructions": step.deepening_instructions,
            }),
        )?;

        let mut payload = vec![ChatMessage::system(system)];
        payload.extend(self.history_window(recent, self.config.step_window_exchanges * 2, true));
        Ok(payload)
    }

    /// Assemble the reflection payload: kind-specific instructions plus a
    /// full replay of the conversation
    pub fn assemble_reflection_context(&self, kind: &ReflectionKind, recent: &[Message]) -> Result<Vec<ChatMessage>> {
        debug!(kind = %kind, recent_count = recent.len(), "assemble_reflection_context: called");
        let system = self.loader.render(kind.template_name(), &kind.payload())?;

        let mut payload = vec![ChatMessage::system(system)];
        payload.extend(self.history_window(recent, usize::MAX, true));
        Ok(payload)
    }

    /// Assemble the summarization payload: the dedicated summarization
    /// register plus the bounded transcript as a single user message
    pub fn assemble_summary_context(&self, messages: &[Message], purpose: &str) -> Result<Vec<ChatMessage>> {
        debug!(message_count = messages.len(), %purpose, "assemble_summary_context: called");
        let system = self.loader.render("summary", &json!({ "purpose": purpose }))?;

        let window = if messages.len() > self.config.summary_window_messages {
            &messages[messages.len() - self.config.summary_window_messages..]
        } else {
            messages
        };

        Ok(vec![ChatMessage::system(system), ChatMessage::user(transcript(window))])
    }

    /// Map stored history into completion roles, bounded to `max` entries
    ///
    /// `include_exercise` keeps exercise-tagged turns (the step register
    /// needs them verbatim); the chat register drops them.
    fn history_window(&self, recent: &[Message], max: usize, include_exercise: bool) -> Vec<ChatMessage> {
        let mut window: Vec<ChatMessage> = recent
            .iter()
            .filter(|m| include_exercise || m.exercise.is_none())
            .filter_map(history_message)
            .collect();

        if window.len() > max {
            window.drain(..window.len() - max);
        }
        window
    }
}

/// Map one stored message to a completion message; notices are framing,
/// not conversation, and are never forwarded
fn history_message(message: &Message) -> Option<ChatMessage> {
    match message.role {
        MessageRole::User => Some(ChatMessage::user(message.text.clone())),
        MessageRole::Assistant | MessageRole::Welcome => Some(ChatMessage::assistant(message.text.clone())),
        MessageRole::Notice => None,
    }
}

/// Render a message window as a plain transcript
fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != MessageRole::Notice)
        .map(|m| {
            let speaker = match m.role {
                MessageRole::User => "Person",
                _ => "Sol",
            };
            format!("{}: {}", speaker, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a `{summary, key_insights}` artifact out of a reply text
///
/// The summarization register asks for bare JSON, but the text is model
/// output; fences and surrounding prose are tolerated. Returns `None`
/// when no artifact can be recovered (SummarizationFailure).
pub fn parse_summary_artifact(text: &str) -> Option<SummaryArtifact> {
    debug!(text_len = text.len(), "parse_summary_artifact: called");
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str(&text[start..=end]).ok()
}
