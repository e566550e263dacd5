//! Chat session and turn types for Lorekeeper.
//!
//! A session is a thread of turns owned by one user. Ownership is encoded in
//! the session id itself: every id must start with `{user_id}-`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Default time-to-live of a session's chat log, refreshed on every append.
pub const DEFAULT_HISTORY_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(TurnRole::User),
            "assistant" | "ai" => Ok(TurnRole::Assistant),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// One message in a session's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(session_id: &str, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(session_id: &str, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Listing entry for a user's sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
    pub preview: String,
}

/// Whether `session_id` belongs to `user_id`.
///
/// The id must begin with the user id immediately followed by `-`; a bare
/// prefix match is not enough (`u1` must not own `u12-abc`).
pub fn session_belongs_to(session_id: &str, user_id: &str) -> bool {
    if user_id.is_empty() {
        return false;
    }
    session_id
        .strip_prefix(user_id)
        .is_some_and(|rest| rest.starts_with('-'))
}

/// Minimum and maximum preview lengths, in characters.
const PREVIEW_MIN_CHARS: usize = 150;
const PREVIEW_MAX_CHARS: usize = 500;

/// Build a listing preview from the most recent assistant reply.
///
/// Takes the first paragraph; when that is shorter than 150 characters the
/// text is extended up to 500 characters and cut at a word boundary.
pub fn session_preview(turns: &[Turn]) -> String {
    let Some(last) = turns.iter().rev().find(|t| t.role == TurnRole::Assistant) else {
        return String::new();
    };
    let content = last.content.trim();
    let first_paragraph = content.split("\n\n").next().unwrap_or_default().trim();

    let source = if first_paragraph.chars().count() >= PREVIEW_MIN_CHARS {
        first_paragraph
    } else {
        content
    };

    if source.chars().count() <= PREVIEW_MAX_CHARS {
        return source.to_string();
    }

    let cut: String = source.chars().take(PREVIEW_MAX_CHARS).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > PREVIEW_MIN_CHARS => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}
