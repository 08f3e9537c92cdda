//! MindStore - append-only session storage for Solace
//!
//! Persists the live conversation as a JSONL message log, with companion
//! records for the daily rate limit, extracted thought patterns, archived
//! sessions, and saved reflection summaries.
//!
//! # Architecture
//!
//! ```text
//! .mindstore/
//! ├── current.jsonl        # live session message log (append-only)
//! ├── ratelimit.json       # daily request counter
//! ├── patterns.jsonl       # extracted thought patterns
//! ├── history/
//! │   └── {session_id}.json
//! └── reflections/
//!     └── {kind}/
//!         └── {artifact_id}.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mindstore::{Message, SessionLog};
//!
//! let log = SessionLog::open(".mindstore")?;
//! log.append_message(&Message::user("I had a rough day"))?;
//! let recent = log.last_messages(10)?;
//! let archive = log.save_to_history()?;
//! ```

mod store;
mod types;

pub use store::{SessionArchive, SessionLog};
pub use types::{Message, MessageRole, RateLimitRecord, SummaryArtifact, ThoughtPattern};

/// Maximum characters kept in the archive excerpt
pub const EXCERPT_MAX_CHARS: usize = 80;

/// Current UTC time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
