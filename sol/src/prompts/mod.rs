//! Prompt templates for Solace
//!
//! Handlebars templates for every prompt register the engine uses, loaded
//! from disk with an embedded fallback.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
