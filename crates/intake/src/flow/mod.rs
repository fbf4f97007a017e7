//! Conversation flow: the fixed field sequence and the transition function.

mod engine;
mod field;
pub mod messages;
mod payload;

pub use engine::{FlowEngine, FlowInput, Transition};
pub use field::Field;
pub use payload::{Answer, ConfirmationPayload, PayloadError};
