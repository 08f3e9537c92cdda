//! CompletionClient trait definition

use async_trait::async_trait;
#[allow(unused_imports)]
use tracing::debug;

use super::{CompletionError, CompletionReply, CompletionRequest};

/// Stateless completion client - each call is independent
///
/// This is the core abstraction for the language-completion service. The
/// engine assembles a bounded prompt for every turn; no conversation state
/// lives on the service side. A reply with `success=false` is a model
/// rejection and must be routed to the canned fallback by the caller.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a single completion request (blocking until complete)
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// One scripted outcome for the mock client
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Return this envelope
        Reply(CompletionReply),
        /// Fail the round-trip (transport-level)
        Fail(String),
    }

    /// Mock completion client for unit tests
    ///
    /// Returns scripted outcomes in order and records every request so
    /// tests can assert on the assembled prompts.
    pub struct MockCompletionClient {
        outcomes: Mutex<VecDeque<MockOutcome>>,
        requests: Mutex<Vec<CompletionRequest>>,
        call_count: AtomicUsize,
    }

    impl MockCompletionClient {
        pub fn new(outcomes: Vec<MockOutcome>) -> Self {
            debug!(outcome_count = %outcomes.len(), "MockCompletionClient::new: called");
            Self {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests captured so far, in call order
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompletionClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError> {
            debug!("MockCompletionClient::complete: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            let next = self.outcomes.lock().unwrap().pop_front();
            match next {
                Some(MockOutcome::Reply(reply)) => Ok(reply),
                Some(MockOutcome::Fail(message)) => Err(CompletionError::InvalidResponse(message)),
                None => Err(CompletionError::InvalidResponse("No more mock outcomes".to_string())),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_client_returns_outcomes_in_order() {
            let client = MockCompletionClient::new(vec![
                MockOutcome::Reply(CompletionReply::text("first")),
                MockOutcome::Fail("boom".to_string()),
            ]);

            let req = CompletionRequest::new(vec![]);
            let reply = client.complete(req.clone()).await.unwrap();
            assert_eq!(reply.message.as_deref(), Some("first"));

            let err = client.complete(req).await;
            assert!(err.is_err());
            assert_eq!(client.call_count(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_captures_requests() {
            let client = MockCompletionClient::new(vec![MockOutcome::Reply(CompletionReply::text("ok"))]);

            let req = CompletionRequest::new(vec![crate::completion::ChatMessage::user("hello")]);
            client.complete(req).await.unwrap();

            let captured = client.requests();
            assert_eq!(captured.len(), 1);
            assert_eq!(captured[0].messages[0].content, "hello");
        }
    }
}
