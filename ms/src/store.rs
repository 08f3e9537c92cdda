//! Core SessionLog implementation

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Message, MessageRole, RateLimitRecord, SummaryArtifact, ThoughtPattern};
use crate::EXCERPT_MAX_CHARS;

/// Derived metadata for a session moved to history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArchive {
    /// Archive identifier (uuid v7)
    pub session_id: String,

    /// Total messages in the session
    pub message_count: usize,

    /// Messages typed by the user
    pub user_message_count: usize,

    /// Messages generated by the completion service
    pub assistant_message_count: usize,

    /// Estimated duration in minutes (first to last timestamp)
    pub estimated_minutes: i64,

    /// First user message, truncated for list display
    pub excerpt: String,

    /// Archive timestamp (unix ms)
    pub archived_at: i64,

    /// The full message list, in original order
    pub messages: Vec<Message>,
}

/// The append-only message log and its companion records
pub struct SessionLog {
    /// Base path for storage
    base_path: PathBuf,
}

impl SessionLog {
    /// Open or create a session log at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        debug!(?base_path, "Opened session log");
        Ok(Self { base_path })
    }

    fn current_path(&self) -> PathBuf {
        self.base_path.join("current.jsonl")
    }

    fn ratelimit_path(&self) -> PathBuf {
        self.base_path.join("ratelimit.json")
    }

    fn patterns_path(&self) -> PathBuf {
        self.base_path.join("patterns.jsonl")
    }

    /// Append one message to the live session log
    pub fn append_message(&self, message: &Message) -> Result<()> {
        debug!(role = %message.role, "append_message: called");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())
            .context("Failed to open message log")?;

        let line = serde_json::to_string(message)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Read every message of the live session, in append order
    pub fn all_messages(&self) -> Result<Vec<Message>> {
        let path = self.current_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path).context("Failed to open message log")?;
        let reader = BufReader::new(file);

        let mut messages = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(&line).context("Corrupt message log line")?;
            messages.push(message);
        }

        Ok(messages)
    }

    /// Read the last `n` messages of the live session
    pub fn last_messages(&self, n: usize) -> Result<Vec<Message>> {
        debug!(%n, "last_messages: called");
        let mut messages = self.all_messages()?;
        if messages.len() > n {
            messages.drain(..messages.len() - n);
        }
        Ok(messages)
    }

    /// Whether the live session has any messages
    pub fn has_session(&self) -> Result<bool> {
        Ok(!self.all_messages()?.is_empty())
    }

    /// Delete the live session log
    pub fn clear_current_session(&self) -> Result<()> {
        debug!("clear_current_session: called");
        let path = self.current_path();
        if path.exists() {
            fs::remove_file(&path).context("Failed to remove message log")?;
            info!("Cleared current session");
        }
        Ok(())
    }

    /// Move the live session to the history archive with derived metadata
    ///
    /// Returns the archive record. The live log is cleared afterwards.
    pub fn save_to_history(&self) -> Result<SessionArchive> {
        debug!("save_to_history: called");
        let messages = self.all_messages()?;

        let session_id = Uuid::now_v7().to_string();
        let user_message_count = messages.iter().filter(|m| m.role == MessageRole::User).count();
        let assistant_message_count = messages.iter().filter(|m| m.role == MessageRole::Assistant).count();

        let estimated_minutes = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_minutes().max(1),
            _ => 0,
        };

        let excerpt = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| truncate_chars(&m.text, EXCERPT_MAX_CHARS))
            .unwrap_or_default();

        let archive = SessionArchive {
            session_id: session_id.clone(),
            message_count: messages.len(),
            user_message_count,
            assistant_message_count,
            estimated_minutes,
            excerpt,
            archived_at: crate::now_ms(),
            messages,
        };

        let history_dir = self.base_path.join("history");
        fs::create_dir_all(&history_dir)?;
        let path = history_dir.join(format!("{}.json", session_id));
        fs::write(&path, serde_json::to_string_pretty(&archive)?).context("Failed to write archive")?;

        self.clear_current_session()?;
        info!(%session_id, message_count = archive.message_count, "Session archived");

        Ok(archive)
    }

    /// List archived session ids, oldest first
    pub fn list_history(&self) -> Result<Vec<String>> {
        let history_dir = self.base_path.join("history");
        if !history_dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&history_dir)? {
            let entry = entry?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load one archived session
    pub fn get_archive(&self, session_id: &str) -> Result<SessionArchive> {
        let path = self.base_path.join("history").join(format!("{}.json", session_id));
        let content = fs::read_to_string(&path).context(format!("Archive not found: {}", session_id))?;
        serde_json::from_str(&content).context("Corrupt archive")
    }

    /// Read the rate-limit record, if one has been written
    pub fn rate_limit_record(&self) -> Result<Option<RateLimitRecord>> {
        let path = self.ratelimit_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).context("Failed to read rate limit record")?;
        let record = serde_json::from_str(&content).context("Corrupt rate limit record")?;
        Ok(Some(record))
    }

    /// Write the rate-limit record
    pub fn save_rate_limit_record(&self, record: &RateLimitRecord) -> Result<()> {
        debug!(date_key = %record.date_key, count = %record.count, "save_rate_limit_record: called");
        fs::write(self.ratelimit_path(), serde_json::to_string(record)?).context("Failed to write rate limit record")
    }

    /// Append extracted thought patterns to the pattern log
    pub fn append_thought_patterns(&self, patterns: &[ThoughtPattern]) -> Result<()> {
        debug!(pattern_count = %patterns.len(), "append_thought_patterns: called");
        if patterns.is_empty() {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.patterns_path())
            .context("Failed to open pattern log")?;

        for pattern in patterns {
            let line = serde_json::to_string(pattern)?;
            writeln!(file, "{}", line)?;
        }
        info!(pattern_count = patterns.len(), "Thought patterns persisted");
        Ok(())
    }

    /// Read every persisted thought pattern
    pub fn thought_patterns(&self) -> Result<Vec<ThoughtPattern>> {
        let path = self.patterns_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path)?;
        let reader = BufReader::new(file);

        let mut patterns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            patterns.push(serde_json::from_str(&line).context("Corrupt pattern log line")?);
        }
        Ok(patterns)
    }

    /// Save a reflection summary under its kind-specific destination
    ///
    /// Returns the path the artifact was written to.
    pub fn save_reflection_summary(&self, kind: &str, artifact: &SummaryArtifact) -> Result<PathBuf> {
        debug!(%kind, "save_reflection_summary: called");
        let dir = self.base_path.join("reflections").join(kind);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", Uuid::now_v7()));
        fs::write(&path, serde_json::to_string_pretty(artifact)?).context("Failed to write reflection summary")?;
        info!(%kind, path = %path.display(), "Reflection summary saved");
        Ok(path)
    }
}

/// Truncate to a character budget, appending an ellipsis when cut
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}
