//! The per-message agent loop.
//!
//! - `AgentState`: transient phase, iteration count and gathered tool results
//! - `prompt`: planning/synthesis prompts and the tool-results block
//! - `SessionOrchestrator`: plans, runs tools, streams the answer and persists the turn

pub mod orchestrator;
pub mod prompt;
pub mod state;

pub use orchestrator::{OrchestratorError, OrchestratorSettings, SessionOrchestrator, TurnOutcome};
pub use state::{AgentState, FailureReason, Phase};
