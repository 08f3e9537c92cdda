//! InsightScheduler - deferred pattern extraction at session end
//!
//! Extraction runs in a detached task so ending a session never waits on
//! it. The task owns its whole error boundary: every failure is logged and
//! swallowed, nothing reaches the caller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mindstore::{Message, MessageRole};

use crate::config::InsightConfig;
use crate::insight::client::{ExtractionRequest, InsightClient, TranscriptLine};
use crate::session::SessionStore;

/// Best-effort background extraction of recurring thought patterns
#[derive(Clone)]
pub struct InsightScheduler {
    store: Arc<dyn SessionStore>,
    client: Arc<dyn InsightClient>,
    config: InsightConfig,
    /// Sessions with an extraction currently in flight
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl InsightScheduler {
    /// Create a scheduler over the given store and extraction client
    pub fn new(store: Arc<dyn SessionStore>, client: Arc<dyn InsightClient>, config: InsightConfig) -> Self {
        debug!(
            min_user_messages = config.min_user_messages,
            min_confidence = config.min_confidence,
            "InsightScheduler::new: called"
        );
        Self {
            store,
            client,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Schedule extraction over a finished session's transcript
    ///
    /// Returns the detached task handle, or `None` when an extraction for
    /// the same session is already in flight (the call is a no-op then).
    /// The transcript is captured at scheduling time so the task does not
    /// race session teardown.
    pub fn extract_at_session_end(&self, session_id: &str, messages: Vec<Message>) -> Option<JoinHandle<()>> {
        debug!(%session_id, message_count = messages.len(), "extract_at_session_end: called");

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(session_id.to_string()) {
                debug!(%session_id, "extract_at_session_end: already in flight, skipping");
                return None;
            }
        }

        let store = Arc::clone(&self.store);
        let client = Arc::clone(&self.client);
        let config = self.config.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let session_id = session_id.to_string();

        Some(tokio::spawn(async move {
            run_extraction(store, client, config, &session_id, messages).await;
            in_flight.lock().unwrap().remove(&session_id);
        }))
    }
}

/// The detached extraction body; never returns an error
async fn run_extraction(
    store: Arc<dyn SessionStore>,
    client: Arc<dyn InsightClient>,
    config: InsightConfig,
    session_id: &str,
    messages: Vec<Message>,
) {
    let substantial_user_messages = messages
        .iter()
        .filter(|m| m.role == MessageRole::User && m.text.chars().count() >= config.min_message_chars)
        .count();

    if substantial_user_messages < config.min_user_messages {
        debug!(
            %session_id,
            substantial_user_messages,
            "run_extraction: too little material, skipping"
        );
        return;
    }

    let request = ExtractionRequest {
        messages: messages
            .iter()
            .filter(|m| m.role == MessageRole::User || m.role == MessageRole::Assistant)
            .map(|m| TranscriptLine {
                role: m.role.to_string(),
                content: m.text.clone(),
            })
            .collect(),
        session_id: session_id.to_string(),
    };

    let reply = match client.extract(request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(%session_id, error = %e, "run_extraction: extraction call failed");
            return;
        }
    };

    if !reply.success {
        warn!(%session_id, error = ?reply.error, "run_extraction: extraction rejected");
        return;
    }

    let patterns: Vec<_> = reply
        .patterns
        .into_iter()
        .filter(|p| p.confidence >= config.min_confidence)
        .map(|p| p.into_thought_pattern(session_id))
        .collect();

    if patterns.is_empty() {
        debug!(%session_id, "run_extraction: no patterns above confidence threshold");
        return;
    }

    match store.append_thought_patterns(&patterns) {
        Ok(()) => info!(%session_id, pattern_count = patterns.len(), "Thought patterns extracted"),
        Err(e) => warn!(%session_id, error = %e, "run_extraction: failed to persist patterns"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::client::mock::MockInsightClient;
    use crate::insight::client::{ExtractedPattern, ExtractionReply};
    use crate::session::store::mock::InMemorySessionStore;
    use std::time::Duration;

    fn substantial(text: &str) -> Message {
        // Padded past the minimum-length gate
        Message::user(format!("{} - and there is honestly a lot more behind it", text))
    }

    fn transcript() -> Vec<Message> {
        vec![
            Message::welcome("Welcome"),
            substantial("I keep assuming everyone is disappointed in me"),
            Message::assistant("What makes you read it that way?"),
            substantial("Whenever a meeting ends quietly I decide it went badly"),
        ]
    }

    fn reply_with(confidences: &[f64]) -> ExtractionReply {
        ExtractionReply {
            success: true,
            patterns: confidences
                .iter()
                .map(|c| ExtractedPattern {
                    original_thought: "They are disappointed in me".to_string(),
                    distortions: vec!["mind-reading".to_string()],
                    reframed_thought: "Quiet endings are just quiet endings".to_string(),
                    confidence: *c,
                })
                .collect(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_extraction_persists_confident_patterns() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::returning(reply_with(&[0.9, 0.3, 0.7])));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        let handle = scheduler.extract_at_session_end("sess-1", transcript()).unwrap();
        handle.await.unwrap();

        // 0.3 is below the default 0.6 threshold
        let patterns = store.saved_patterns();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().all(|p| p.session_id == "sess-1"));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_yield_one_extraction() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::returning(reply_with(&[0.9])).with_delay(Duration::from_millis(50)));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        let first = scheduler.extract_at_session_end("sess-1", transcript());
        let second = scheduler.extract_at_session_end("sess-1", transcript());

        assert!(first.is_some());
        assert!(second.is_none());

        first.unwrap().await.unwrap();
        assert_eq!(client.call_count(), 1);
        assert_eq!(store.saved_patterns().len(), 1);
    }

    #[tokio::test]
    async fn test_different_sessions_extract_independently() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::returning(reply_with(&[0.9])));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        let a = scheduler.extract_at_session_end("sess-a", transcript()).unwrap();
        let b = scheduler.extract_at_session_end("sess-b", transcript()).unwrap();
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_too_little_material_skips_endpoint() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::returning(reply_with(&[0.9])));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        // One short user message: below both gates
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let handle = scheduler.extract_at_session_end("sess-1", messages).unwrap();
        handle.await.unwrap();

        assert_eq!(client.call_count(), 0);
        assert!(store.saved_patterns().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::failing("backend down"));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        let handle = scheduler.extract_at_session_end("sess-1", transcript()).unwrap();
        // The task neither panics nor surfaces the error
        handle.await.unwrap();

        assert!(store.saved_patterns().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_entry_clears_after_completion() {
        let store = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(MockInsightClient::returning(reply_with(&[0.9])));
        let scheduler = InsightScheduler::new(store.clone(), client.clone(), InsightConfig::default());

        scheduler
            .extract_at_session_end("sess-1", transcript())
            .unwrap()
            .await
            .unwrap();

        // A later call for the same session is allowed again
        assert!(scheduler.extract_at_session_end("sess-1", transcript()).is_some());
    }
}
