//! Open-ended guided reflections

mod engine;
mod kind;

pub use engine::{ReflectionEngine, ReflectionEvent};
pub use kind::ReflectionKind;
