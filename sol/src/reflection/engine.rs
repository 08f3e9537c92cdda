//! ReflectionEngine - open-ended guided reflections
//!
//! One state machine serves all three reflection kinds; everything
//! kind-specific comes from the [`ReflectionKind`] descriptor. A
//! reflection is bounded by an eligibility gate (`can_end`) and ends in a
//! saved summary artifact. The summary view and the underlying reflection
//! have separate lifecycles: cancelling the view keeps the conversation
//! alive.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use regex::Regex;
use tracing::{debug, info, warn};

use mindstore::{Message, SummaryArtifact};

use crate::completion::{CompletionClient, CompletionRequest, fallback_text};
use crate::context::{ContextAssembler, parse_summary_artifact};
use crate::quota::RateLimiter;
use crate::reflection::ReflectionKind;
use crate::session::SessionStore;

/// Turns required before the end gate opens
const MIN_TURNS: u32 = 3;

/// Elapsed time that opens the end gate regardless of turns
const MIN_ELAPSED: Duration = Duration::from_secs(120);

/// Literal phrases that short-circuit a turn straight into `end()`
const END_PHRASES: [&str; 3] = [
    "end here and create a summary",
    "finish the reflection",
    "create a summary now",
];

/// Suggestion pair prepended when the reply offers to summarize
const END_SUGGESTION: &str = "End here and create a summary";
const CONTINUE_SUGGESTION: &str = "Keep exploring";

/// Result of one reflection event
#[derive(Debug)]
pub enum ReflectionEvent {
    /// Reflection opened; the first prompt was appended
    Opened { reply: Message, suggestions: Vec<String> },
    /// A normal turn completed
    Continued {
        reply: Message,
        suggestions: Vec<String>,
        can_end: bool,
    },
    /// A summary artifact is ready for review
    SummaryReady { artifact: SummaryArtifact },
    /// Summarization failed; the reflection was abandoned without a summary
    SummaryFailed,
    /// Daily quota exhausted; no completion request was made
    QuotaExceeded { notice: Message },
    /// Completion failure on a normal turn; the reflection stays active
    Fallback { notice: Message },
    /// The event is not valid right now
    OutOfPhase,
}

/// Runtime state of one reflection
#[derive(Debug)]
struct ReflectionRuntime {
    kind: ReflectionKind,
    /// User turns taken in this reflection
    counter: u32,
    started_at: Instant,
    /// Eligibility gate; monotonic once true
    can_end: bool,
}

impl ReflectionRuntime {
    fn refresh_gate(&mut self) {
        self.can_end = self.can_end || self.counter >= MIN_TURNS || self.started_at.elapsed() >= MIN_ELAPSED;
    }
}

/// Generic state machine for the three reflection variants
pub struct ReflectionEngine {
    store: Arc<dyn SessionStore>,
    completion: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    limiter: RateLimiter,
    daily_limit: u32,
    runtime: Option<ReflectionRuntime>,
    /// Summary awaiting save/cancel; independent of `runtime`
    pending_summary: Option<SummaryArtifact>,
}

impl ReflectionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        limiter: RateLimiter,
        daily_limit: u32,
    ) -> Self {
        Self {
            store,
            completion,
            assembler,
            limiter,
            daily_limit,
            runtime: None,
            pending_summary: None,
        }
    }

    /// Whether a reflection is in progress
    pub fn is_active(&self) -> bool {
        self.runtime.is_some()
    }

    /// Whether the end gate is open
    pub fn can_end(&self) -> bool {
        self.runtime.as_ref().map(|r| r.can_end).unwrap_or(false)
    }

    /// User turns taken so far
    pub fn counter(&self) -> u32 {
        self.runtime.as_ref().map(|r| r.counter).unwrap_or(0)
    }

    /// Store the kind payload, reset counters, and request the opening turn
    pub async fn start(&mut self, kind: ReflectionKind) -> ReflectionEvent {
        debug!(kind = %kind, "start: called");
        self.runtime = Some(ReflectionRuntime {
            kind,
            counter: 0,
            started_at: Instant::now(),
            can_end: false,
        });
        self.pending_summary = None;

        if let Some(event) = self.quota_gate() {
            return event;
        }

        match self.turn_round_trip().await {
            Ok((reply, suggestions)) => ReflectionEvent::Opened { reply, suggestions },
            Err(notice) => ReflectionEvent::Fallback { notice },
        }
    }

    /// Process one user response
    ///
    /// The three literal end-phrases short-circuit directly to `end()`;
    /// the text is never forwarded as a normal turn.
    pub async fn submit_response(&mut self, text: &str) -> ReflectionEvent {
        debug!(counter = self.counter(), "submit_response: called");
        if self.runtime.is_none() {
            return ReflectionEvent::OutOfPhase;
        }

        if is_end_phrase(text) {
            info!("submit_response: end phrase detected, ending reflection");
            return self.end().await;
        }

        let _ = self.store.append_message(&Message::user(text));
        {
            let runtime = self.runtime.as_mut().expect("runtime checked above");
            runtime.counter += 1;
            runtime.refresh_gate();
        }

        if let Some(event) = self.quota_gate() {
            return event;
        }

        match self.turn_round_trip().await {
            Ok((reply, mut suggestions)) => {
                if offers_summary(&reply.text) {
                    debug!("submit_response: reply offers a summary, overriding suggestions");
                    let mut overridden = vec![END_SUGGESTION.to_string(), CONTINUE_SUGGESTION.to_string()];
                    overridden.append(&mut suggestions);
                    suggestions = overridden;
                }
                ReflectionEvent::Continued {
                    reply,
                    suggestions,
                    can_end: self.can_end(),
                }
            }
            Err(notice) => ReflectionEvent::Fallback { notice },
        }
    }

    /// Synthesize the summary artifact from the recent transcript
    ///
    /// On failure the reflection is abandoned without a summary rather
    /// than exposing a partial result.
    pub async fn end(&mut self) -> ReflectionEvent {
        debug!("end: called");
        let Some(runtime) = self.runtime.as_ref() else {
            return ReflectionEvent::OutOfPhase;
        };

        let purpose = runtime.kind.summary_purpose();
        let messages = self.store.all_messages().unwrap_or_default();

        let payload = match self.assembler.assemble_summary_context(&messages, purpose) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "end: context assembly failed");
                return self.abandon();
            }
        };

        match self.completion.complete(CompletionRequest::new(payload)).await {
            Ok(reply) if reply.success => match parse_summary_artifact(reply.text_or_empty()) {
                Some(artifact) => {
                    self.pending_summary = Some(artifact.clone());
                    ReflectionEvent::SummaryReady { artifact }
                }
                None => {
                    warn!("end: reply carried no parsable artifact");
                    self.abandon()
                }
            },
            Ok(reply) => {
                warn!(error = ?reply.error, "end: summarization rejected");
                self.abandon()
            }
            Err(e) => {
                warn!(error = %e, "end: summarization failed");
                self.abandon()
            }
        }
    }

    /// Persist the pending summary to its kind-specific destination and
    /// clear the runtime state
    pub fn save(&mut self) -> bool {
        debug!("save: called");
        let (Some(runtime), Some(artifact)) = (self.runtime.as_ref(), self.pending_summary.as_ref()) else {
            return false;
        };

        if let Err(e) = self.store.save_reflection_summary(runtime.kind.slug(), artifact) {
            warn!(error = %e, "save: persist failed, keeping state for retry");
            return false;
        }

        info!(kind = %runtime.kind, "save: reflection summary saved");
        self.runtime = None;
        self.pending_summary = None;
        true
    }

    /// Discard the summary view only; the reflection stays in progress so
    /// the user can keep talking
    pub fn cancel(&mut self) {
        debug!("cancel: called");
        self.pending_summary = None;
    }

    fn abandon(&mut self) -> ReflectionEvent {
        self.runtime = None;
        self.pending_summary = None;
        ReflectionEvent::SummaryFailed
    }

    /// One kind-contexted round-trip; appends and returns the reply
    async fn turn_round_trip(&mut self) -> Result<(Message, Vec<String>), Message> {
        let runtime = self.runtime.as_ref().expect("runtime exists");
        let recent = self.store.all_messages().unwrap_or_default();

        let payload = self
            .assembler
            .assemble_reflection_context(&runtime.kind, &recent)
            .map_err(|e| {
                warn!(error = %e, "turn_round_trip: context assembly failed");
                self.append_fallback()
            })?;

        match self.completion.complete(CompletionRequest::new(payload)).await {
            Ok(reply) if reply.success => {
                let _ = self.limiter.record_success(self.daily_limit);
                let message = Message::assistant(reply.text_or_empty());
                let _ = self.store.append_message(&message);
                Ok((message, reply.suggestions))
            }
            Ok(reply) => {
                warn!(error = ?reply.error, "turn_round_trip: rejected");
                Err(self.append_fallback())
            }
            Err(e) => {
                warn!(error = %e, "turn_round_trip: failed");
                Err(self.append_fallback())
            }
        }
    }

    fn append_fallback(&self) -> Message {
        let notice = Message::assistant(fallback_text());
        let _ = self.store.append_message(&notice);
        notice
    }

    fn quota_gate(&self) -> Option<ReflectionEvent> {
        match self.limiter.can_proceed(self.daily_limit) {
            Ok(status) if status.limit_reached => {
                let notice = Message::notice(status.notice().unwrap_or_default());
                let _ = self.store.append_message(&notice);
                Some(ReflectionEvent::QuotaExceeded { notice })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "quota_gate: limiter failed");
                Some(ReflectionEvent::QuotaExceeded {
                    notice: Message::notice(fallback_text()),
                })
            }
        }
    }

    #[cfg(test)]
    fn backdate_start(&mut self, elapsed: Duration) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.started_at = Instant::now() - elapsed;
        }
    }
}

/// Case-insensitive substring match against the literal end phrases
fn is_end_phrase(text: &str) -> bool {
    let lowered = text.to_lowercase();
    END_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Heuristic: does the reply text offer to wrap up with a summary?
fn offers_summary(text: &str) -> bool {
    static OFFER: OnceLock<Regex> = OnceLock::new();
    let offer = OFFER.get_or_init(|| {
        Regex::new(r"(?i)(would you like|shall (i|we)|want me to|ready to|we could)[^.?!]{0,60}summar(y|ize|ise)")
            .expect("offer regex is valid")
    });
    offer.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::client::mock::{MockCompletionClient, MockOutcome};
    use crate::completion::CompletionReply;
    use crate::config::{ContextConfig, ProfileConfig, QuotaConfig};
    use crate::prompts::PromptLoader;
    use crate::session::store::mock::InMemorySessionStore;

    const SUMMARY_JSON: &str = r#"{"summary":"You explored honesty.","key_insights":["It starts at home"]}"#;

    fn value_kind() -> ReflectionKind {
        ReflectionKind::Value {
            value: "honesty".to_string(),
        }
    }

    fn engine_with(outcomes: Vec<MockOutcome>) -> (ReflectionEngine, Arc<MockCompletionClient>, Arc<InMemorySessionStore>) {
        engine_with_quota(outcomes, QuotaConfig::default().free_daily_limit, 0)
    }

    fn engine_with_quota(
        outcomes: Vec<MockOutcome>,
        limit: u32,
        used: u32,
    ) -> (ReflectionEngine, Arc<MockCompletionClient>, Arc<InMemorySessionStore>) {
        let store = Arc::new(
            InMemorySessionStore::new().with_rate_limit(mindstore::RateLimitRecord {
                date_key: chrono::Local::now().date_naive().format("%Y-%m-%d").to_string(),
                count: used,
                limit,
            }),
        );
        let completion = Arc::new(MockCompletionClient::new(outcomes));
        let assembler = ContextAssembler::new(
            PromptLoader::embedded_only(),
            ContextConfig::default(),
            ProfileConfig::default(),
        );
        let limiter = RateLimiter::new(store.clone());
        let engine = ReflectionEngine::new(store.clone(), completion.clone(), assembler, limiter, limit);
        (engine, completion, store)
    }

    fn reply(text: &str) -> MockOutcome {
        MockOutcome::Reply(CompletionReply::text(text).suggesting(vec!["It shows up at work".to_string()]))
    }

    #[tokio::test]
    async fn test_start_opens_reflection() {
        let (mut engine, _, store) = engine_with(vec![reply("What does honesty mean to you?")]);

        let event = engine.start(value_kind()).await;
        assert!(matches!(event, ReflectionEvent::Opened { .. }));
        assert!(engine.is_active());
        assert_eq!(engine.counter(), 0);
        assert!(!engine.can_end());
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn test_gate_opens_at_three_turns_and_stays_open() {
        let mut outcomes = vec![reply("opening")];
        for i in 0..5 {
            outcomes.push(reply(&format!("turn {}", i)));
        }
        let (mut engine, _, _) = engine_with(outcomes);
        engine.start(value_kind()).await;

        engine.submit_response("it means telling the truth").await;
        assert!(!engine.can_end());
        engine.submit_response("even when it costs me").await;
        assert!(!engine.can_end());

        let event = engine.submit_response("especially then").await;
        let ReflectionEvent::Continued { can_end, .. } = event else {
            panic!("expected Continued");
        };
        assert!(can_end);
        assert_eq!(engine.counter(), 3);

        // Monotonic: never reverts within one reflection
        engine.submit_response("more").await;
        assert!(engine.can_end());
    }

    #[tokio::test]
    async fn test_gate_opens_on_elapsed_time() {
        let (mut engine, _, _) = engine_with(vec![reply("opening"), reply("turn")]);
        engine.start(value_kind()).await;
        engine.backdate_start(Duration::from_secs(121));

        engine.submit_response("one short answer").await;
        assert_eq!(engine.counter(), 1);
        assert!(engine.can_end());
    }

    #[tokio::test]
    async fn test_end_phrase_short_circuits_without_normal_turn() {
        let (mut engine, completion, store) = engine_with(vec![
            reply("opening"),
            reply("turn one"),
            MockOutcome::Reply(CompletionReply::text(SUMMARY_JSON)),
        ]);
        engine.start(value_kind()).await;
        engine.submit_response("it means a lot to me").await;

        // Turn 2 is the literal phrase (with surrounding words)
        let event = engine.submit_response("Please create a summary now").await;
        let ReflectionEvent::SummaryReady { artifact } = event else {
            panic!("expected SummaryReady");
        };
        assert_eq!(artifact.summary, "You explored honesty.");

        // opening + turn + summarization; no turn for the phrase itself
        assert_eq!(completion.call_count(), 3);
        assert_eq!(engine.counter(), 1);
        let texts: Vec<_> = store.all_messages().unwrap().iter().map(|m| m.text.clone()).collect();
        assert!(!texts.iter().any(|t| t.contains("create a summary now")));
    }

    #[tokio::test]
    async fn test_all_end_phrases_match_case_insensitively() {
        assert!(is_end_phrase("END HERE AND CREATE A SUMMARY"));
        assert!(is_end_phrase("let's finish the reflection please"));
        assert!(is_end_phrase("Create a Summary Now"));
        assert!(!is_end_phrase("I want to summarize my feelings"));
    }

    #[tokio::test]
    async fn test_summary_offer_overrides_suggestions() {
        let (mut engine, _, _) = engine_with(vec![
            reply("opening"),
            MockOutcome::Reply(
                CompletionReply::text("We've covered a lot. Would you like me to create a summary of it?")
                    .suggesting(vec!["Let's go deeper".to_string()]),
            ),
        ]);
        engine.start(value_kind()).await;

        let event = engine.submit_response("I think we've gone deep").await;
        let ReflectionEvent::Continued { suggestions, .. } = event else {
            panic!("expected Continued");
        };
        assert_eq!(suggestions[0], END_SUGGESTION);
        assert_eq!(suggestions[1], CONTINUE_SUGGESTION);
        assert_eq!(suggestions[2], "Let's go deeper");
    }

    #[tokio::test]
    async fn test_plain_reply_keeps_model_suggestions() {
        let (mut engine, _, _) = engine_with(vec![reply("opening"), reply("tell me more")]);
        engine.start(value_kind()).await;

        let event = engine.submit_response("hm").await;
        let ReflectionEvent::Continued { suggestions, .. } = event else {
            panic!("expected Continued");
        };
        assert_eq!(suggestions, vec!["It shows up at work".to_string()]);
    }

    #[tokio::test]
    async fn test_end_failure_abandons_without_summary() {
        let (mut engine, _, _) = engine_with(vec![reply("opening"), MockOutcome::Fail("down".to_string())]);
        engine.start(value_kind()).await;

        let event = engine.end().await;
        assert!(matches!(event, ReflectionEvent::SummaryFailed));
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_unparsable_summary_abandons() {
        let (mut engine, _, _) = engine_with(vec![
            reply("opening"),
            MockOutcome::Reply(CompletionReply::text("I can't produce that right now")),
        ]);
        engine.start(value_kind()).await;

        let event = engine.end().await;
        assert!(matches!(event, ReflectionEvent::SummaryFailed));
    }

    #[tokio::test]
    async fn test_save_persists_to_kind_destination() {
        let (mut engine, _, store) = engine_with(vec![
            reply("opening"),
            MockOutcome::Reply(CompletionReply::text(SUMMARY_JSON)),
        ]);
        engine.start(value_kind()).await;
        engine.end().await;

        assert!(engine.save());
        let saved = store.saved_reflections();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "value");
        assert!(!engine.is_active());

        // Nothing pending: save is not repeatable
        assert!(!engine.save());
    }

    #[tokio::test]
    async fn test_cancel_keeps_reflection_alive() {
        let (mut engine, _, _) = engine_with(vec![
            reply("opening"),
            MockOutcome::Reply(CompletionReply::text(SUMMARY_JSON)),
            reply("go on then"),
        ]);
        engine.start(value_kind()).await;
        engine.end().await;

        engine.cancel();
        assert!(engine.is_active());

        // The user keeps talking in the same reflection
        let event = engine.submit_response("actually, one more thing").await;
        assert!(matches!(event, ReflectionEvent::Continued { .. }));
        assert_eq!(engine.counter(), 1);
    }

    #[tokio::test]
    async fn test_quota_reached_never_calls_completion() {
        let (mut engine, completion, _) = engine_with_quota(vec![], 10, 10);

        let event = engine.start(value_kind()).await;
        assert!(matches!(event, ReflectionEvent::QuotaExceeded { .. }));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_turn_failure_keeps_reflection_active() {
        let (mut engine, _, _) = engine_with(vec![reply("opening"), MockOutcome::Fail("flaky".to_string())]);
        engine.start(value_kind()).await;

        let event = engine.submit_response("something meaningful").await;
        assert!(matches!(event, ReflectionEvent::Fallback { .. }));
        assert!(engine.is_active());
        assert_eq!(engine.counter(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_start_is_out_of_phase() {
        let (mut engine, _, _) = engine_with(vec![]);
        assert!(matches!(engine.submit_response("hi").await, ReflectionEvent::OutOfPhase));
        assert!(matches!(engine.end().await, ReflectionEvent::OutOfPhase));
    }

    #[test]
    fn test_offers_summary_heuristic() {
        assert!(offers_summary("Would you like me to create a summary of what we explored?"));
        assert!(offers_summary("Shall we wrap up with a summary?"));
        assert!(offers_summary("We could end here and I'll summarize."));
        assert!(!offers_summary("Tell me more about that feeling."));
        assert!(!offers_summary("In summary, life is hard.")); // statement, not an offer
    }
}
