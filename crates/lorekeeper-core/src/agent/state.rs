//! Transient per-message agent state.
//!
//! Threaded explicitly through the orchestrator and dropped once the turn is
//! persisted; nothing here is ever stored.

use std::fmt;

use tracing::debug;

use lorekeeper_types::llm::ToolCall;
use lorekeeper_types::tool::ToolInvocation;

/// Where a message is in the agent loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    LoadingContext,
    Planning,
    ToolExecuting,
    Synthesizing,
    Persisting,
    Streaming,
    Done,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    SessionUnauthorized,
    ModelUnavailable,
    PersistenceError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SessionUnauthorized => write!(f, "session_unauthorized"),
            FailureReason::ModelUnavailable => write!(f, "model_unavailable"),
            FailureReason::PersistenceError => write!(f, "persistence_error"),
        }
    }
}

#[derive(Debug)]
pub struct AgentState {
    phase: Phase,
    /// Completed tool-invoking planning rounds.
    pub iteration_count: u32,
    /// Tool calls from the latest planning response, not yet executed.
    pub pending_plan: Vec<ToolCall>,
    /// Every tool call of this turn, in execution order.
    pub tool_results: Vec<ToolInvocation>,
    pub final_answer: String,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            phase: Phase::LoadingContext,
            iteration_count: 0,
            pending_plan: Vec::new(),
            tool_results: Vec::new(),
            final_answer: String::new(),
        }
    }

    pub fn advance(&mut self, next: Phase) {
        debug!(from = ?self.phase, to = ?next, iteration = self.iteration_count, "agent phase");
        self.phase = next;
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.advance(Phase::Failed(reason));
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}
