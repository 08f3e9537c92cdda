//! ExerciseFlowEngine - the guided exercise state machine
//!
//! Phases: `Idle → PreMoodCapture → Active(step) → {Active(step+1) |
//! Completing} → Idle`. Transitions are driven by discrete caller events;
//! the completion service's per-turn `advance` signal decides step
//! movement, but the engine clamps indexes and counters regardless of what
//! the signal claims. Every completion failure exits the flow (fail
//! closed); no step increment ever happens on failure.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mindstore::{Message, SummaryArtifact};

use crate::completion::{ChatMessage, CompletionClient, CompletionRequest, fallback_text};
use crate::context::{ContextAssembler, parse_summary_artifact};
use crate::exercise::catalog::{self, ExerciseFlowDefinition};
use crate::insight::InsightScheduler;
use crate::quota::RateLimiter;
use crate::session::SessionStore;

/// Where the engine is in the flow lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// No exercise running
    Idle,
    /// Waiting for the opening mood rating
    PreMoodCapture,
    /// Working through step `step` (0-based)
    Active { step: usize },
    /// Flow finished; waiting for the closing mood gate
    Completing,
}

/// Result of asking the engine to start a flow
#[derive(Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// Flow resolved; the pre-mood gate is open
    PreMoodCapture { flow_name: &'static str },
    /// No catalog entry for the descriptor; the engine stays idle
    UnknownFlow,
    /// A flow is already running
    AlreadyActive,
}

/// Result of one exercise event
#[derive(Debug)]
pub enum ExerciseEvent {
    /// Stayed on the current step; a deepening reply was appended
    Deepened { reply: Message, suggestions: Vec<String> },
    /// Moved to the next step
    SteppedForward {
        banner: Message,
        reply: Message,
        suggestions: Vec<String>,
    },
    /// Flow finished; the post-mood gate is open
    Completed {
        closing: Message,
        recap: Option<SummaryArtifact>,
        extraction: Option<JoinHandle<()>>,
    },
    /// Daily quota exhausted; no completion request was made
    QuotaExceeded { notice: Message },
    /// Completion failure; the flow exited to idle
    Aborted { notice: Message },
    /// The event is not valid in the current phase
    OutOfPhase,
}

/// Runtime state of the active flow
#[derive(Debug)]
struct FlowRuntime {
    flow: &'static ExerciseFlowDefinition,
    /// Current step, 0-based; never exceeds `steps.len() - 1`
    step: usize,
    /// Messages spent on the current step; 1 on entry
    step_turns: u32,
}

/// Finite-state machine for guided multi-step exercises
pub struct ExerciseFlowEngine {
    store: Arc<dyn SessionStore>,
    completion: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    limiter: RateLimiter,
    scheduler: InsightScheduler,
    daily_limit: u32,
    session_id: String,
    phase: FlowPhase,
    runtime: Option<FlowRuntime>,
}

impl ExerciseFlowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        limiter: RateLimiter,
        scheduler: InsightScheduler,
        daily_limit: u32,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            completion,
            assembler,
            limiter,
            scheduler,
            daily_limit,
            session_id: session_id.into(),
            phase: FlowPhase::Idle,
            runtime: None,
        }
    }

    /// Current phase
    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    /// Messages spent on the current step, if a flow is active
    pub fn step_turns(&self) -> Option<u32> {
        self.runtime.as_ref().map(|r| r.step_turns)
    }

    /// Resolve a descriptor and open the pre-mood gate
    ///
    /// Fails closed: an unknown descriptor leaves the engine idle with no
    /// partial state.
    pub fn start(&mut self, descriptor: &str) -> StartOutcome {
        debug!(%descriptor, phase = ?self.phase, "start: called");
        if self.phase != FlowPhase::Idle {
            return StartOutcome::AlreadyActive;
        }

        let Some(flow) = catalog::resolve(descriptor) else {
            info!(%descriptor, "start: no flow definition, staying idle");
            return StartOutcome::UnknownFlow;
        };

        self.runtime = Some(FlowRuntime {
            flow,
            step: 0,
            step_turns: 1,
        });
        self.phase = FlowPhase::PreMoodCapture;
        StartOutcome::PreMoodCapture { flow_name: flow.name }
    }

    /// Record the opening mood rating and request step-1 content
    ///
    /// A completion failure here falls back to idle without ever entering
    /// the active phase.
    pub async fn confirm_pre_mood(&mut self, rating: u8) -> ExerciseEvent {
        debug!(%rating, phase = ?self.phase, "confirm_pre_mood: called");
        if self.phase != FlowPhase::PreMoodCapture {
            return ExerciseEvent::OutOfPhase;
        }
        let flow = self.runtime.as_ref().expect("runtime exists in PreMoodCapture").flow;

        if let Err(e) = self.append(
            Message::notice(format!("Mood check-in: {}/5", rating.clamp(1, 5))).tagged(flow.category),
        ) {
            warn!(error = %e, "confirm_pre_mood: store append failed");
        }

        if let Some(event) = self.quota_gate() {
            return event;
        }

        // Implicit "ready to start" user turn; never persisted
        let payload = match self.step_payload(true) {
            Ok(mut payload) => {
                payload.push(ChatMessage::user("I'm ready to start."));
                payload
            }
            Err(event) => return event,
        };

        match self.completion.complete(CompletionRequest::new(payload)).await {
            Ok(reply) if reply.success => {
                let _ = self.limiter.record_success(self.daily_limit);
                let banner = self.step_banner();
                let _ = self.append(banner);
                let message = Message::assistant(reply.text_or_empty()).tagged(flow.category);
                let _ = self.append(message.clone());
                self.phase = FlowPhase::Active { step: 0 };
                ExerciseEvent::Deepened {
                    reply: message,
                    suggestions: reply.suggestions,
                }
            }
            other => {
                debug!(failed = true, "confirm_pre_mood: completion failed, exiting to idle");
                self.abort_with_fallback(other.err().map(|e| e.to_string()))
            }
        }
    }

    /// Process one user response within the active step
    pub async fn submit_step_response(&mut self, text: &str) -> ExerciseEvent {
        debug!(phase = ?self.phase, "submit_step_response: called");
        let FlowPhase::Active { .. } = self.phase else {
            return ExerciseEvent::OutOfPhase;
        };
        let flow = self.runtime.as_ref().expect("runtime exists in Active").flow;

        let _ = self.append(Message::user(text).tagged(flow.category));

        if let Some(event) = self.quota_gate() {
            return event;
        }

        // First turn on a freshly entered step gets the initial variant;
        // every stay bumps the counter, so repeated stays are visible to
        // the next prompt as the deepening variant.
        let first_turn = self.runtime.as_ref().map(|r| r.step_turns == 1).unwrap_or(false);
        let payload = match self.step_payload(first_turn) {
            Ok(payload) => payload,
            Err(event) => return event,
        };

        let reply = match self.completion.complete(CompletionRequest::new(payload)).await {
            Ok(reply) if reply.success => reply,
            other => {
                debug!("submit_step_response: completion failed, exiting to idle");
                return self.abort_with_fallback(other.err().map(|e| e.to_string()));
            }
        };
        let _ = self.limiter.record_success(self.daily_limit);

        // The signal is authoritative but unverified: default to stay,
        // clamp every index it implies.
        let advance = reply.advance.unwrap_or(false);
        let runtime = self.runtime.as_mut().expect("runtime exists in Active");

        if !advance {
            runtime.step_turns = runtime.step_turns.saturating_add(1);
            let message = Message::assistant(reply.text_or_empty()).tagged(runtime.flow.category);
            let _ = self.append(message.clone());
            return ExerciseEvent::Deepened {
                reply: message,
                suggestions: reply.suggestions,
            };
        }

        if runtime.step + 1 < runtime.flow.step_count() {
            runtime.step += 1;
            runtime.step_turns = 1;
            let step = runtime.step;
            self.phase = FlowPhase::Active { step };

            let banner = self.step_banner();
            let _ = self.append(banner.clone());
            let message = Message::assistant(reply.text_or_empty()).tagged(flow.category);
            let _ = self.append(message.clone());
            info!(flow = flow.name, step, "submit_step_response: advanced");
            return ExerciseEvent::SteppedForward {
                banner,
                reply: message,
                suggestions: reply.suggestions,
            };
        }

        // Last step done
        self.complete_flow(reply.text_or_empty()).await
    }

    /// Record the closing mood rating (if given) and return to idle
    pub fn confirm_post_mood(&mut self, rating: Option<u8>) -> bool {
        debug!(?rating, phase = ?self.phase, "confirm_post_mood: called");
        if self.phase != FlowPhase::Completing {
            return false;
        }

        if let (Some(rating), Some(runtime)) = (rating, self.runtime.as_ref()) {
            let _ = self.append(
                Message::notice(format!("Mood check-out: {}/5", rating.clamp(1, 5))).tagged(runtime.flow.category),
            );
        }

        self.phase = FlowPhase::Idle;
        self.runtime = None;
        true
    }

    /// Emit the completion message, request the recap when the category
    /// needs one, and schedule background extraction
    async fn complete_flow(&mut self, closing_text: &str) -> ExerciseEvent {
        let runtime = self.runtime.as_ref().expect("runtime exists at completion");
        let flow = runtime.flow;
        info!(flow = flow.name, "complete_flow: flow finished");

        let closing = Message::assistant(closing_text)
            .titled(format!("{} complete", flow.name))
            .tagged(flow.category);
        let _ = self.append(closing.clone());

        // Categories with a structured recap get one dedicated
        // summarization round-trip; everything else goes straight to the
        // mood gate. Recap failure also goes straight to the gate.
        let recap = if flow.recap {
            self.request_recap().await
        } else {
            None
        };

        let transcript = self.store.all_messages().unwrap_or_default();
        let extraction = self.scheduler.extract_at_session_end(&self.session_id, transcript);

        self.phase = FlowPhase::Completing;
        ExerciseEvent::Completed {
            closing,
            recap,
            extraction,
        }
    }

    /// One summarization round-trip; `None` on any failure
    async fn request_recap(&self) -> Option<SummaryArtifact> {
        let runtime = self.runtime.as_ref()?;
        let messages = self.store.all_messages().ok()?;
        let purpose = format!("guided \"{}\" exercise", runtime.flow.name);

        let payload = match self.assembler.assemble_summary_context(&messages, &purpose) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "request_recap: context assembly failed");
                return None;
            }
        };

        match self.completion.complete(CompletionRequest::new(payload)).await {
            Ok(reply) if reply.success => {
                let artifact = parse_summary_artifact(reply.text_or_empty());
                if artifact.is_none() {
                    warn!("request_recap: reply carried no parsable artifact");
                }
                artifact
            }
            Ok(reply) => {
                warn!(error = ?reply.error, "request_recap: summarization rejected");
                None
            }
            Err(e) => {
                warn!(error = %e, "request_recap: summarization failed");
                None
            }
        }
    }

    /// Check the quota; `Some(..)` short-circuits before any request
    fn quota_gate(&self) -> Option<ExerciseEvent> {
        match self.limiter.can_proceed(self.daily_limit) {
            Ok(status) if status.limit_reached => {
                let notice = Message::notice(status.notice().unwrap_or_default());
                let _ = self.append(notice.clone());
                Some(ExerciseEvent::QuotaExceeded { notice })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "quota_gate: limiter failed");
                Some(ExerciseEvent::QuotaExceeded {
                    notice: Message::notice(fallback_text()),
                })
            }
        }
    }

    /// Assemble the step payload for the current runtime state
    fn step_payload(&self, first_turn: bool) -> Result<Vec<ChatMessage>, ExerciseEvent> {
        let runtime = self.runtime.as_ref().expect("runtime exists");
        let recent = self.store.all_messages().unwrap_or_default();
        self.assembler
            .assemble_exercise_step_context(&recent, runtime.flow, runtime.step, first_turn)
            .map_err(|e| {
                warn!(error = %e, "step_payload: context assembly failed");
                ExerciseEvent::Aborted {
                    notice: Message::notice(fallback_text()),
                }
            })
    }

    /// Framed "Step k/n: title" message for the current step
    fn step_banner(&self) -> Message {
        let runtime = self.runtime.as_ref().expect("runtime exists");
        let step = runtime.flow.step(runtime.step);
        let text = format!("Step {}/{}: {}", runtime.step + 1, runtime.flow.step_count(), step.title);
        Message::notice(text.clone()).titled(text).tagged(runtime.flow.category)
    }

    /// Exit to idle with the canned fallback appended
    fn abort_with_fallback(&mut self, error: Option<String>) -> ExerciseEvent {
        if let Some(error) = error {
            warn!(%error, "abort_with_fallback: completion failure");
        }
        let tag = self.runtime.as_ref().map(|r| r.flow.category);
        let mut notice = Message::assistant(fallback_text());
        if let Some(tag) = tag {
            notice = notice.tagged(tag);
        }
        let _ = self.append(notice.clone());

        self.phase = FlowPhase::Idle;
        self.runtime = None;
        ExerciseEvent::Aborted { notice }
    }

    fn append(&self, message: Message) -> eyre::Result<()> {
        self.store.append_message(&message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::client::mock::{MockCompletionClient, MockOutcome};
    use crate::completion::CompletionReply;
    use crate::config::{ContextConfig, InsightConfig, ProfileConfig, QuotaConfig};
    use crate::insight::client::mock::MockInsightClient;
    use crate::insight::ExtractionReply;
    use crate::prompts::PromptLoader;
    use crate::session::store::mock::InMemorySessionStore;

    fn engine_with(outcomes: Vec<MockOutcome>) -> (ExerciseFlowEngine, Arc<MockCompletionClient>, Arc<InMemorySessionStore>) {
        engine_with_quota(outcomes, QuotaConfig::default().free_daily_limit, 0)
    }

    fn engine_with_quota(
        outcomes: Vec<MockOutcome>,
        limit: u32,
        used: u32,
    ) -> (ExerciseFlowEngine, Arc<MockCompletionClient>, Arc<InMemorySessionStore>) {
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
        let scheduler = InsightScheduler::new(
            store.clone(),
            Arc::new(MockInsightClient::returning(ExtractionReply {
                success: true,
                patterns: vec![],
                error: None,
            })),
            InsightConfig::default(),
        );

        let engine = ExerciseFlowEngine::new(
            store.clone(),
            completion.clone(),
            assembler,
            limiter,
            scheduler,
            limit,
            "sess-test",
        );
        (engine, completion, store)
    }

    fn step_reply(text: &str, advance: bool) -> MockOutcome {
        MockOutcome::Reply(
            CompletionReply::with_advance(text, advance).suggesting(vec!["I noticed tension".to_string()]),
        )
    }

    #[test]
    fn test_start_unknown_flow_fails_closed() {
        let (mut engine, _, store) = engine_with(vec![]);
        assert_eq!(engine.start("juggling"), StartOutcome::UnknownFlow);
        assert_eq!(engine.phase(), FlowPhase::Idle);
        assert_eq!(store.message_count(), 0);
    }

    #[test]
    fn test_start_opens_pre_mood_gate() {
        let (mut engine, _, _) = engine_with(vec![]);
        let outcome = engine.start("Box Breathing");
        assert_eq!(
            outcome,
            StartOutcome::PreMoodCapture {
                flow_name: "Calming breath"
            }
        );
        assert_eq!(engine.phase(), FlowPhase::PreMoodCapture);
        assert_eq!(engine.start("breathing"), StartOutcome::AlreadyActive);
    }

    #[tokio::test]
    async fn test_pre_mood_enters_step_one() {
        let (mut engine, completion, store) = engine_with(vec![step_reply("Let's begin. Sit comfortably.", false)]);
        engine.start("breathing");

        let event = engine.confirm_pre_mood(3).await;
        assert!(matches!(event, ExerciseEvent::Deepened { .. }));
        assert_eq!(engine.phase(), FlowPhase::Active { step: 0 });
        assert_eq!(engine.step_turns(), Some(1));

        // mood notice + step banner + assistant reply
        assert_eq!(store.message_count(), 3);
        let messages = store.all_messages().unwrap();
        assert!(messages[1].text.starts_with("Step 1/4:"));

        // The implicit "ready" turn went to the service, not the log
        let request = &completion.requests()[0];
        assert_eq!(request.messages.last().unwrap().content, "I'm ready to start.");
        assert!(store.all_messages().unwrap().iter().all(|m| m.text != "I'm ready to start."));
    }

    #[tokio::test]
    async fn test_pre_mood_failure_falls_back_to_idle() {
        let (mut engine, _, _) = engine_with(vec![MockOutcome::Fail("timeout".to_string())]);
        engine.start("breathing");

        let event = engine.confirm_pre_mood(3).await;
        assert!(matches!(event, ExerciseEvent::Aborted { .. }));
        assert_eq!(engine.phase(), FlowPhase::Idle);
        assert_eq!(engine.step_turns(), None);
    }

    #[tokio::test]
    async fn test_terse_answer_stays_on_step_counter_two() {
        let (mut engine, _, _) = engine_with(vec![
            step_reply("Welcome to step one", false),
            step_reply("Take your time - what else do you notice?", false),
        ]);
        engine.start("body-scan");
        engine.confirm_pre_mood(2).await;

        let event = engine.submit_step_response("fine").await;
        assert!(matches!(event, ExerciseEvent::Deepened { .. }));
        assert_eq!(engine.phase(), FlowPhase::Active { step: 0 });
        assert_eq!(engine.step_turns(), Some(2));
    }

    #[tokio::test]
    async fn test_repeated_stay_never_moves_step() {
        let mut outcomes = vec![step_reply("step one", false)];
        for _ in 0..6 {
            outcomes.push(step_reply("stay with it", false));
        }
        let (mut engine, _, _) = engine_with(outcomes);
        engine.start("body-scan");
        engine.confirm_pre_mood(2).await;

        for i in 0..6u32 {
            engine.submit_step_response("hm").await;
            assert_eq!(engine.phase(), FlowPhase::Active { step: 0 });
            assert_eq!(engine.step_turns(), Some(i + 2));
        }
    }

    #[tokio::test]
    async fn test_advance_moves_step_and_resets_counter() {
        let (mut engine, _, store) = engine_with(vec![
            step_reply("step one", false),
            step_reply("deeper", false),
            step_reply("moving on", true),
        ]);
        engine.start("breathing");
        engine.confirm_pre_mood(3).await;
        engine.submit_step_response("my shoulders are tight").await;

        let event = engine.submit_step_response("the tightness eased while I watched it").await;
        assert!(matches!(event, ExerciseEvent::SteppedForward { .. }));
        assert_eq!(engine.phase(), FlowPhase::Active { step: 1 });
        assert_eq!(engine.step_turns(), Some(1));

        let messages = store.all_messages().unwrap();
        assert!(messages.iter().any(|m| m.text.starts_with("Step 2/4:")));
    }

    #[tokio::test]
    async fn test_last_step_completes_without_recap() {
        // body-scan: 3 steps, no recap
        let (mut engine, completion, _) = engine_with(vec![
            step_reply("step one", false),
            step_reply("step two", true),
            step_reply("step three", true),
            step_reply("all done, well held", true),
        ]);
        engine.start("body-scan");
        engine.confirm_pre_mood(3).await;
        engine.submit_step_response("a").await;
        engine.submit_step_response("b").await;

        let event = engine.submit_step_response("c").await;
        let ExerciseEvent::Completed { recap, extraction, .. } = event else {
            panic!("expected completion");
        };
        assert!(recap.is_none());
        assert_eq!(engine.phase(), FlowPhase::Completing);
        // No summarization round-trip happened
        assert_eq!(completion.call_count(), 4);

        if let Some(handle) = extraction {
            handle.await.unwrap();
        }
        assert!(engine.confirm_post_mood(Some(4)));
        assert_eq!(engine.phase(), FlowPhase::Idle);
    }

    #[tokio::test]
    async fn test_vision_flow_requests_recap() {
        let recap_json = r#"{"summary":"You pictured a calmer working life.","key_insights":["Mornings matter"]}"#;
        let (mut engine, completion, _) = engine_with(vec![
            step_reply("step one", false),
            step_reply("step two", true),
            step_reply("step three", true),
            step_reply("that's a vivid picture", true),
            MockOutcome::Reply(CompletionReply::text(recap_json)),
        ]);
        engine.start("vision of future");
        engine.confirm_pre_mood(3).await;
        engine.submit_step_response("a good day would start slow").await;
        engine.submit_step_response("my sister is there").await;

        let event = engine.submit_step_response("I'd have changed teams").await;
        let ExerciseEvent::Completed { recap, .. } = event else {
            panic!("expected completion");
        };
        let recap = recap.unwrap();
        assert_eq!(recap.summary, "You pictured a calmer working life.");
        assert_eq!(completion.call_count(), 5);
    }

    #[tokio::test]
    async fn test_recap_failure_skips_to_mood_gate() {
        let (mut engine, _, _) = engine_with(vec![
            step_reply("step one", false),
            step_reply("step two", true),
            step_reply("step three", true),
            step_reply("done", true),
            MockOutcome::Fail("summarizer down".to_string()),
        ]);
        engine.start("vision of future");
        engine.confirm_pre_mood(3).await;
        engine.submit_step_response("a").await;
        engine.submit_step_response("b").await;

        let event = engine.submit_step_response("c").await;
        let ExerciseEvent::Completed { recap, .. } = event else {
            panic!("expected completion despite recap failure");
        };
        assert!(recap.is_none());
        assert_eq!(engine.phase(), FlowPhase::Completing);
    }

    #[tokio::test]
    async fn test_quota_reached_never_calls_completion() {
        let (mut engine, completion, _) = engine_with_quota(vec![], 10, 10);
        engine.start("breathing");

        let event = engine.confirm_pre_mood(3).await;
        assert!(matches!(event, ExerciseEvent::QuotaExceeded { .. }));
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_mid_step_exits_without_increment() {
        let (mut engine, _, _) = engine_with(vec![
            step_reply("step one", false),
            MockOutcome::Fail("connection reset".to_string()),
        ]);
        engine.start("breathing");
        engine.confirm_pre_mood(3).await;

        let event = engine.submit_step_response("something long and thoughtful").await;
        assert!(matches!(event, ExerciseEvent::Aborted { .. }));
        assert_eq!(engine.phase(), FlowPhase::Idle);
        assert_eq!(engine.step_turns(), None);
    }

    #[tokio::test]
    async fn test_model_rejection_also_fails_closed() {
        let (mut engine, _, _) = engine_with(vec![
            step_reply("step one", false),
            MockOutcome::Reply(CompletionReply::rejected("content filter")),
        ]);
        engine.start("breathing");
        engine.confirm_pre_mood(3).await;

        let event = engine.submit_step_response("hello").await;
        assert!(matches!(event, ExerciseEvent::Aborted { .. }));
        assert_eq!(engine.phase(), FlowPhase::Idle);
    }

    #[tokio::test]
    async fn test_events_out_of_phase() {
        let (mut engine, _, _) = engine_with(vec![]);
        assert!(matches!(engine.submit_step_response("hi").await, ExerciseEvent::OutOfPhase));
        assert!(matches!(engine.confirm_pre_mood(3).await, ExerciseEvent::OutOfPhase));
        assert!(!engine.confirm_post_mood(Some(3)));
    }
}
