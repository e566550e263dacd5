use thiserror::Error;

/// Errors from repository operations (used by trait definitions in lorekeeper-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised while executing a tool on behalf of the planning model.
///
/// These never abort a turn: the orchestrator renders them as text and
/// feeds them into the next planning step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid dice notation: '{0}'")]
    InvalidNotation(String),

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("path escapes campaign scope: '{0}'")]
    PathEscape(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),
}

/// Outcome of a failed push to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection no longer exists; further sends for the turn are pointless.
    #[error("connection gone")]
    Gone,

    #[error("delivery failed: {0}")]
    Failed(String),
}
