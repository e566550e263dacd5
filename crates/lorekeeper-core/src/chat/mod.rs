//! Conversation history: the durable per-session log and the
//! per-invocation cache the agent loop reads it through.

pub mod cache;
pub mod history;

pub use cache::ContextCache;
pub use history::ChatHistoryStore;
