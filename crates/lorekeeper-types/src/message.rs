//! WebSocket wire frames.
//!
//! Inbound frames carry an `action` tag; outbound frames carry a `type` tag
//! and a `content` payload.

use serde::{Deserialize, Serialize};

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundFrame {
    Chat(ChatRequest),
    Ping,
}

/// A chat message addressed to one of the caller's sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub campaign: String,
    pub message: String,
}

impl ChatRequest {
    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.campaign.trim().is_empty() {
            missing.push("campaign");
        }
        if self.message.trim().is_empty() {
            missing.push("message");
        }
        if self.session_id.trim().is_empty() {
            missing.push("sessionId");
        }
        missing
    }
}

/// One text block inside a `chunk` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
    pub index: u32,
}

impl TextBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: text.into(),
            index: 0,
        }
    }
}

/// A frame pushed to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A piece of the answer as it is synthesized.
    Chunk(Vec<TextBlock>),
    /// The turn finished and was persisted.
    Complete(String),
    /// The turn failed; no `complete` frame follows.
    Error(String),
    /// Another connection of the same user finished a turn in this session.
    SessionUpdated { session_id: String },
    Pong,
}

impl OutboundFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        OutboundFrame::Chunk(vec![TextBlock::text(text)])
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Chunk(_) => "chunk",
            OutboundFrame::Complete(_) => "complete",
            OutboundFrame::Error(_) => "error",
            OutboundFrame::SessionUpdated { .. } => "session_updated",
            OutboundFrame::Pong => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_chat_frame_parses_camel_case() {
        let json = r#"{"action":"chat","sessionId":"u1-abc","campaign":"dragons","message":"roll 1d20"}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Chat(ChatRequest {
                session_id: "u1-abc".to_string(),
                campaign: "dragons".to_string(),
                message: "roll 1d20".to_string(),
            })
        );
    }

    #[test]
    fn test_inbound_unknown_action_rejected() {
        let json = r#"{"action":"delete","sessionId":"u1-abc"}"#;
        assert!(serde_json::from_str::<InboundFrame>(json).is_err());
    }

    #[test]
    fn test_missing_fields_reported() {
        let req = ChatRequest {
            session_id: "u1-abc".to_string(),
            campaign: " ".to_string(),
            message: String::new(),
        };
        assert_eq!(req.missing_fields(), vec!["campaign", "message"]);
    }

    #[test]
    fn test_chunk_frame_shape() {
        let json = serde_json::to_value(OutboundFrame::chunk("Hello")).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "Hello");
        assert_eq!(json["content"][0]["index"], 0);
    }

    #[test]
    fn test_complete_and_error_frame_shape() {
        let json = serde_json::to_value(OutboundFrame::Complete("done".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "complete", "content": "done"}));

        let json = serde_json::to_value(OutboundFrame::Error("nope".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "content": "nope"}));
    }

    #[test]
    fn test_session_updated_frame_shape() {
        let frame = OutboundFrame::SessionUpdated {
            session_id: "u1-abc".to_string(),
        };
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["type"], "session_updated");
        assert_eq!(json["content"]["session_id"], "u1-abc");
    }
}
