//! Solace - session & exercise orchestration engine
//!
//! Solace turns raw user text into a managed, multi-turn interaction with
//! an external language-completion service: bounded prompt contexts, daily
//! usage quotas, a model-driven multi-step exercise state machine, and
//! deferred background reflection analysis.
//!
//! # Core Concepts
//!
//! - **Respond first, persist second**: ending a session returns control
//!   immediately; archiving and insight extraction run afterwards
//! - **Fail closed**: completion failures never leave partial exercise
//!   state behind
//! - **Unverified advance signal**: the service decides step movement, but
//!   every index and counter is clamped defensively
//!
//! # Modules
//!
//! - [`completion`] - completion client trait and HTTP implementation
//! - [`context`] - bounded prompt payload assembly
//! - [`exercise`] - guided exercise catalog and state machine
//! - [`reflection`] - generic open-ended reflection engine
//! - [`quota`] - daily usage quota with date-based reset
//! - [`insight`] - background thought-pattern extraction
//! - [`session`] - plain-chat orchestration and the storage seam
//! - [`config`] - configuration types and loading
//! - [`cli`] / [`repl`] - terminal front end

pub mod cli;
pub mod completion;
pub mod config;
pub mod context;
pub mod exercise;
pub mod insight;
pub mod prompts;
pub mod quota;
pub mod reflection;
pub mod repl;
pub mod session;

// Re-export commonly used types
pub use completion::{
    ChatMessage, ChatRole, CompletionClient, CompletionError, CompletionReply, CompletionRequest, HttpCompletionClient,
    create_client,
};
pub use config::Config;
pub use context::{ContextAssembler, parse_summary_artifact};
pub use exercise::{ExerciseEvent, ExerciseFlowDefinition, ExerciseFlowEngine, FlowPhase, StartOutcome};
pub use insight::{HttpInsightClient, InsightClient, InsightScheduler};
pub use mindstore::{Message, MessageRole, RateLimitRecord, SessionArchive, SummaryArtifact, ThoughtPattern};
pub use prompts::PromptLoader;
pub use quota::{QuotaStatus, RateLimiter, SubscriptionTier};
pub use reflection::{ReflectionEngine, ReflectionEvent, ReflectionKind};
pub use session::{ChatEvent, SessionEndReceipt, SessionEngine, SessionStore};
