//! Guided multi-step exercises

pub mod catalog;
mod engine;

pub use catalog::{ExerciseFlowDefinition, FlowStep, normalize_category, resolve};
pub use engine::{ExerciseEvent, ExerciseFlowEngine, FlowPhase, StartOutcome};
