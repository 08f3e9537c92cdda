//! Prompt context assembly

mod assembler;

pub use assembler::{ContextAssembler, parse_summary_artifact};
