//! SessionStore trait - the engine's view of persistent storage
//!
//! The engines only ever see this trait: an append/read message log plus
//! the handful of companion records they maintain. `mindstore::SessionLog`
//! is the production implementation.

use eyre::Result;

use mindstore::{Message, RateLimitRecord, SessionArchive, SessionLog, SummaryArtifact, ThoughtPattern};

/// Append/read access to the live session and its companion records
pub trait SessionStore: Send + Sync {
    /// Append one message to the live session log
    fn append_message(&self, message: &Message) -> Result<()>;

    /// Read every message of the live session, in append order
    fn all_messages(&self) -> Result<Vec<Message>>;

    /// Read the last `n` messages of the live session
    fn last_messages(&self, n: usize) -> Result<Vec<Message>>;

    /// Delete the live session log
    fn clear_current_session(&self) -> Result<()>;

    /// Move the live session to the history archive with derived metadata
    fn save_to_history(&self) -> Result<SessionArchive>;

    /// Read the rate-limit record, if one has been written
    fn rate_limit_record(&self) -> Result<Option<RateLimitRecord>>;

    /// Write the rate-limit record
    fn save_rate_limit_record(&self, record: &RateLimitRecord) -> Result<()>;

    /// Append extracted thought patterns
    fn append_thought_patterns(&self, patterns: &[ThoughtPattern]) -> Result<()>;

    /// Save a reflection summary under its kind-specific destination
    fn save_reflection_summary(&self, kind: &str, artifact: &SummaryArtifact) -> Result<()>;
}

impl SessionStore for SessionLog {
    fn append_message(&self, message: &Message) -> Result<()> {
        SessionLog::append_message(self, message)
    }

    fn all_messages(&self) -> Result<Vec<Message>> {
        SessionLog::all_messages(self)
    }

    fn last_messages(&self, n: usize) -> Result<Vec<Message>> {
        SessionLog::last_messages(self, n)
    }

    fn clear_current_session(&self) -> Result<()> {
        SessionLog::clear_current_session(self)
    }

    fn save_to_history(&self) -> Result<SessionArchive> {
        SessionLog::save_to_history(self)
    }

    fn rate_limit_record(&self) -> Result<Option<RateLimitRecord>> {
        SessionLog::rate_limit_record(self)
    }

    fn save_rate_limit_record(&self, record: &RateLimitRecord) -> Result<()> {
        SessionLog::save_rate_limit_record(self, record)
    }

    fn append_thought_patterns(&self, patterns: &[ThoughtPattern]) -> Result<()> {
        SessionLog::append_thought_patterns(self, patterns)
    }

    fn save_reflection_summary(&self, kind: &str, artifact: &SummaryArtifact) -> Result<()> {
        SessionLog::save_reflection_summary(self, kind, artifact).map(|_| ())
    }
}
