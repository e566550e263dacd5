//! Tool catalog and invocation records.
//!
//! The set of tools is closed: `ToolKind` enumerates every tool the planning
//! model may request. Each tool declares which pieces of session context the
//! orchestrator injects; those fields are never taken from model output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Every tool the assistant can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    SearchCampaign,
    GetFileContent,
    RollDice,
    GetConversationHistory,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::SearchCampaign,
        ToolKind::GetFileContent,
        ToolKind::RollDice,
        ToolKind::GetConversationHistory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::SearchCampaign => "search_campaign",
            ToolKind::GetFileContent => "get_file_content",
            ToolKind::RollDice => "roll_dice",
            ToolKind::GetConversationHistory => "get_conversation_history",
        }
    }

    /// Context fields the orchestrator attaches to this tool's arguments.
    pub fn injected_fields(&self) -> &'static [ContextField] {
        match self {
            ToolKind::SearchCampaign | ToolKind::GetFileContent => {
                &[ContextField::UserId, ContextField::Campaign]
            }
            ToolKind::GetConversationHistory => &[ContextField::SessionId],
            ToolKind::RollDice => &[],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("Unknown tool: {s}"))
    }
}

/// A piece of authenticated session context a tool may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    UserId,
    Campaign,
    SessionId,
}

impl ContextField {
    /// Argument key under which the field is passed to the tool.
    pub fn key(&self) -> &'static str {
        match self {
            ContextField::UserId => "user_id",
            ContextField::Campaign => "campaign",
            ContextField::SessionId => "session_id",
        }
    }
}

/// Authenticated context of the turn being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedContext {
    pub user_id: String,
    pub campaign: String,
    pub session_id: String,
}

impl InjectedContext {
    pub fn value_of(&self, field: ContextField) -> &str {
        match field {
            ContextField::UserId => &self.user_id,
            ContextField::Campaign => &self.campaign,
            ContextField::SessionId => &self.session_id,
        }
    }
}

/// Record of one tool call made during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name as requested by the model (may name no known tool).
    pub name: String,
    /// Arguments the model declared, before injection.
    pub arguments: serde_json::Value,
    /// Context the orchestrator attached, keyed by argument name.
    #[serde(default)]
    pub injected: BTreeMap<String, String>,
    /// Text result on success, rendered error on failure.
    pub outcome: ToolOutcome,
}

/// Result of a tool call as seen by the planning model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(String),
    Error(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text) | ToolOutcome::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }
}

/// Natural result on a single d20.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Critical {
    Success,
    Failure,
}

/// Outcome of a `roll_dice` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    pub notation: String,
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
    pub rolls: Vec<u32>,
    pub total: i64,
    pub critical: Option<Critical>,
}

impl fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rolls = self
            .rolls
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Rolling {}: [{rolls}]", self.notation)?;
        if self.modifier > 0 {
            write!(f, " + {}", self.modifier)?;
        } else if self.modifier < 0 {
            write!(f, " - {}", self.modifier.unsigned_abs())?;
        }
        write!(f, " = {}", self.total)?;
        match self.critical {
            Some(Critical::Success) => write!(f, " (natural 20, critical success!)"),
            Some(Critical::Failure) => write!(f, " (natural 1, critical failure!)"),
            None => Ok(()),
        }
    }
}

/// One ranked snippet returned by campaign search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub file_path: String,
    pub category: Option<String>,
    pub chunk_text: String,
    /// Cosine distance; lower is closer.
    pub distance: f32,
}
