//! Completion client module for Solace
//!
//! Provides the round-trip to the language-completion service and the
//! structured reply envelope the engines consume.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod http;
mod types;

pub use client::CompletionClient;
pub use error::CompletionError;
pub use http::HttpCompletionClient;
pub use types::{ChatMessage, ChatRole, CompletionReply, CompletionRequest, FALLBACK_TEXT, fallback_text};

use crate::config::CompletionConfig;

/// Create the completion client from configuration
pub fn create_client(config: &CompletionConfig) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    debug!(base_url = %config.base_url, "create_client: called");
    Ok(Arc::new(HttpCompletionClient::from_config(config)?))
}
