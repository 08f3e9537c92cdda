//! SessionEngine - plain-chat orchestration and session teardown
//!
//! The open-conversation path: quota gate, context assembly, one
//! completion round-trip, append. Ending a session returns control to the
//! caller immediately; archiving and insight extraction run in detached
//! tasks afterward ("respond first, persist/extract second").

use std::sync::{Arc, OnceLock};
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mindstore::{Message, MessageRole};

use crate::completion::{CompletionClient, CompletionRequest, fallback_text};
use crate::context::ContextAssembler;
use crate::exercise::normalize_category;
use crate::insight::InsightScheduler;
use crate::quota::RateLimiter;
use crate::session::SessionStore;

/// Opening greeting of a fresh session; canned, never model-authored
const WELCOME_TEXT: &str = "Hi, I'm Sol. This is your space - whatever is on your mind, we can sit with it together.";

/// Result of one chat turn
#[derive(Debug)]
pub enum ChatEvent {
    /// Normal reply; `quota_notice` carries low-count/warning phrasing
    Replied {
        reply: Message,
        suggestions: Vec<String>,
        quota_notice: Option<String>,
    },
    /// Daily quota exhausted; no completion request was made
    QuotaExceeded { notice: Message },
    /// Completion failure; the canned fallback was appended instead
    Fallback { notice: Message },
    /// The session was ended while the round-trip was in flight; the
    /// reply was dropped rather than applied to the next session
    Stale,
}

/// Handles for the background work a session end kicks off
#[derive(Debug)]
pub struct SessionEndReceipt {
    /// Archival or teardown task
    pub persistence: JoinHandle<()>,
    /// Insight extraction task, when one was scheduled
    pub extraction: Option<JoinHandle<()>>,
}

/// Orchestrates the plain conversation register
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    completion: Arc<dyn CompletionClient>,
    assembler: ContextAssembler,
    limiter: RateLimiter,
    scheduler: InsightScheduler,
    daily_limit: u32,
    session_id: String,
    /// Bumped whenever the session is ended; in-flight replies from an
    /// older epoch are dropped instead of leaking into the next session
    epoch: u64,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionClient>,
        assembler: ContextAssembler,
        limiter: RateLimiter,
        scheduler: InsightScheduler,
        daily_limit: u32,
    ) -> Self {
        Self {
            store,
            completion,
            assembler,
            limiter,
            scheduler,
            daily_limit,
            session_id: Uuid::now_v7().to_string(),
            epoch: 0,
        }
    }

    /// Identifier of the live session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Process one plain chat message
    pub async fn submit(&mut self, text: &str) -> ChatEvent {
        debug!(session_id = %self.session_id, "submit: called");
        self.ensure_welcome();
        let _ = self.store.append_message(&Message::user(text));

        // Quota short-circuits before the completion call: no request is
        // consumed once the limit is reached.
        let status = match self.limiter.can_proceed(self.daily_limit) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "submit: limiter failed");
                return ChatEvent::Fallback {
                    notice: self.append_fallback(),
                };
            }
        };
        if status.limit_reached {
            let notice = Message::notice(status.notice().unwrap_or_default());
            let _ = self.store.append_message(&notice);
            return ChatEvent::QuotaExceeded { notice };
        }

        let recent = self.store.all_messages().unwrap_or_default();
        let payload = match self.assembler.assemble_chat_context(&recent) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "submit: context assembly failed");
                return ChatEvent::Fallback {
                    notice: self.append_fallback(),
                };
            }
        };

        let epoch = self.epoch;
        let result = self.completion.complete(CompletionRequest::new(payload)).await;
        if epoch != self.epoch {
            debug!("submit: session ended mid-flight, dropping stale reply");
            return ChatEvent::Stale;
        }

        match result {
            Ok(reply) if reply.success => {
                let _ = self.limiter.record_success(self.daily_limit);
                let message = Message::assistant(reply.text_or_empty());
                let _ = self.store.append_message(&message);

                let quota_notice = self
                    .limiter
                    .can_proceed(self.daily_limit)
                    .ok()
                    .and_then(|status| status.notice());

                ChatEvent::Replied {
                    reply: message,
                    suggestions: reply.suggestions,
                    quota_notice,
                }
            }
            other => {
                if let Err(e) = other {
                    warn!(error = %e, "submit: completion failed");
                }
                ChatEvent::Fallback {
                    notice: self.append_fallback(),
                }
            }
        }
    }

    /// End the current session
    ///
    /// Returns immediately; persistence (archive or plain teardown) and
    /// insight extraction run in detached tasks. The transcript for
    /// extraction is captured before teardown starts, so the two cannot
    /// race.
    pub fn end_session(&mut self, save_to_history: bool) -> SessionEndReceipt {
        info!(session_id = %self.session_id, save_to_history, "end_session: called");
        self.epoch += 1;

        let messages = self.store.all_messages().unwrap_or_default();
        let ended_id = std::mem::replace(&mut self.session_id, Uuid::now_v7().to_string());

        let extraction = self.scheduler.extract_at_session_end(&ended_id, messages);

        let store = Arc::clone(&self.store);
        let persistence = tokio::spawn(async move {
            let result = if save_to_history {
                store.save_to_history().map(|_| ())
            } else {
                store.clear_current_session()
            };
            if let Err(e) = result {
                warn!(session_id = %ended_id, error = %e, "end_session: persistence failed");
            }
        });

        SessionEndReceipt { persistence, extraction }
    }

    /// Scan recent turns for a confirmed exercise suggestion
    ///
    /// Free-text keyword matching: the previous assistant turn must have
    /// mentioned a known exercise, and the latest user turn must read as
    /// an affirmation. A structured signal from the completion service
    /// would replace this.
    pub fn detect_exercise_confirmation(&self) -> Option<String> {
        let recent = self.store.last_messages(6).ok()?;
        detect_exercise_confirmation(&recent)
    }

    fn ensure_welcome(&self) {
        let fresh = self.store.all_messages().map(|m| m.is_empty()).unwrap_or(false);
        if fresh {
            debug!("ensure_welcome: starting fresh session");
            let _ = self.store.append_message(&Message::welcome(WELCOME_TEXT));
        }
    }

    fn append_fallback(&self) -> Message {
        let notice = Message::assistant(fallback_text());
        let _ = self.store.append_message(&notice);
        notice
    }
}

/// Exercise keywords recognized in assistant suggestions
const EXERCISE_KEYWORDS: [(&str, &str); 6] = [
    ("breathing", "breathing"),
    ("breath", "breathing"),
    ("body scan", "body-scan"),
    ("gratitude", "gratitude"),
    ("grounding", "grounding"),
    ("vision of the future", "vision-of-future"),
];

/// Keyword heuristic over recent assistant/user turns
fn detect_exercise_confirmation(recent: &[Message]) -> Option<String> {
    static AFFIRMATION: OnceLock<Regex> = OnceLock::new();
    let affirmation = AFFIRMATION.get_or_init(|| {
        Regex::new(r"(?i)^\s*(yes|yeah|yep|sure|ok(ay)?|sounds good|let's (do|try) (it|that)|i'd like (that|to))\b")
            .expect("affirmation regex is valid")
    });

    let last_user = recent.iter().rev().find(|m| m.role == MessageRole::User)?;
    if !affirmation.is_match(&last_user.text) {
        return None;
    }

    // The offer must come from an assistant turn before the affirmation
    let offer = recent
        .iter()
        .rev()
        .skip_while(|m| m.id != last_user.id)
        .skip(1)
        .find(|m| m.role == MessageRole::Assistant)?;

    let lowered = offer.text.to_lowercase();
    EXERCISE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, category)| normalize_category(category))
}
