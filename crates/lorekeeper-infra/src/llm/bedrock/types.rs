//! AWS Bedrock request/response types.
//!
//! Claude models on Bedrock speak the Anthropic Messages JSON format with two
//! differences: the `model` field is omitted from the body (it goes in the
//! URL path) and `anthropic_version` is required. Cohere embedding models use
//! their own small `texts`/`embeddings` format on the same invoke endpoint.

use serde::{Deserialize, Serialize};

/// Request body for Bedrock Claude invoke / invoke-with-response-stream.
#[derive(Debug, Clone, Serialize)]
pub struct BedrockRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<BedrockMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<BedrockTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// A single text message in a Claude conversation.
#[derive(Debug, Clone, Serialize)]
pub struct BedrockMessage {
    pub role: String,
    pub content: String,
}

/// A tool the model may call, in Anthropic's `tools` shape.
#[derive(Debug, Clone, Serialize)]
pub struct BedrockTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response and stream event payloads
//
// Each decoded stream chunk carries a JSON object whose `type` names the
// event; we deserialize the payload into a specific struct per type.
// ---------------------------------------------------------------------------

/// Non-streaming Claude response.
#[derive(Debug, Clone, Deserialize)]
pub struct BedrockResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: BedrockUsage,
}

/// A content block in a Claude response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

impl ContentBlock {
    pub fn type_name(&self) -> &str {
        match self {
            ContentBlock::Text { .. } => "text",
            ContentBlock::ToolUse { .. } => "tool_use",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BedrockUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartPayload {
    pub message: MessageObj,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageObj {
    pub id: String,
    pub model: String,
    pub usage: Option<BedrockUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockStartPayload {
    pub index: u32,
    pub content_block: ContentBlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockDeltaPayload {
    pub index: u32,
    pub delta: Delta,
}

/// Delta types within a content block. Anything else is skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Delta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockStopPayload {
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaPayload {
    pub delta: MessageDeltaObj,
    #[serde(default)]
    pub usage: BedrockUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaObj {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: BedrockError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BedrockError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// A single chunk in the Bedrock event stream.
///
/// Bedrock wraps each event inside `{"bytes":"<base64>"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BedrockStreamChunk {
    pub bytes: String,
}

// ---------------------------------------------------------------------------
// Cohere embeddings
// ---------------------------------------------------------------------------

/// Request body for `cohere.embed-*` models.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
    /// `search_document` when indexing, `search_query` when searching.
    pub input_type: String,
    pub truncate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
}
