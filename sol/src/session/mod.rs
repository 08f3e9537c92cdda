//! Session orchestration and storage seam

mod engine;
pub mod store;

pub use engine::{ChatEvent, SessionEndReceipt, SessionEngine};
pub use store::SessionStore;
