//! Conversation engine and its transcript types.

mod engine;
mod message;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{CANCELLED_ERROR, ConversationEngine, MessageSink, RunContext};
pub use message::{AgentRunResult, ConversationMessage};
