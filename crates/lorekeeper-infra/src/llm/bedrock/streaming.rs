//! AWS Bedrock event stream parser and async stream adapter.
//!
//! Bedrock streaming uses the AWS event stream binary protocol (not SSE).
//! Each frame has the layout:
//!
//! ```text
//! [total_len:4][headers_len:4][prelude_crc:4][headers...][payload...][msg_crc:4]
//! ```
//!
//! For `chunk` events the payload is `{"bytes":"<base64>"}` where the
//! base64-decoded content is a Claude stream event (e.g.
//! `{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}`).
//!
//! This module provides a minimal parser that extracts events without pulling
//! in the full AWS SDK.
//!
//! Only synthesis streams, which carry no tools, go through here. Tool-use
//! blocks surface as plain block start/stop events and their input deltas
//! are skipped.

use std::pin::Pin;

use base64::Engine;
use futures_util::{Stream, StreamExt};

use lorekeeper_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::client::BedrockEndpoint;
use super::types::{
    BedrockRequest, BedrockStreamChunk, ContentBlockDeltaPayload, ContentBlockStartPayload,
    ContentBlockStopPayload, Delta, ErrorPayload, MessageDeltaPayload, MessageStartPayload,
};

/// Parsed header from a binary event stream frame.
#[derive(Debug)]
struct EventHeader {
    name: String,
    value: String,
}

/// Parse binary headers from an AWS event stream frame.
///
/// Header format: `[name_len:1][name:N][type:1][value_len:2][value:M]`
/// We only handle type 7 (string) which is what Bedrock uses.
fn parse_headers(mut buf: &[u8]) -> Vec<EventHeader> {
    let mut headers = Vec::new();
    while !buf.is_empty() {
        let name_len = buf[0] as usize;
        buf = &buf[1..];
        if buf.len() < name_len {
            break;
        }
        let name = String::from_utf8_lossy(&buf[..name_len]).to_string();
        buf = &buf[name_len..];

        if buf.is_empty() {
            break;
        }
        let header_type = buf[0];
        buf = &buf[1..];

        if header_type != 7 {
            // Unknown header type: its length is unknown, so stop here
            break;
        }
        if buf.len() < 2 {
            break;
        }
        let value_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        buf = &buf[2..];
        if buf.len() < value_len {
            break;
        }
        let value = String::from_utf8_lossy(&buf[..value_len]).to_string();
        buf = &buf[value_len..];
        headers.push(EventHeader { name, value });
    }
    headers
}

/// Parse one binary event stream frame from the buffer.
///
/// Returns `Some((event_type, payload_bytes, bytes_consumed))` on success,
/// or `None` if the buffer doesn't contain a complete frame yet.
fn parse_event_stream_frame(buf: &[u8]) -> Option<(String, Vec<u8>, usize)> {
    if buf.len() < 12 {
        return None;
    }

    let total_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let headers_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    // bytes 8..12 = prelude CRC (skip)

    if buf.len() < total_len {
        return None;
    }

    let headers_start = 12;
    let headers_end = headers_start + headers_len;
    let payload_end = total_len.checked_sub(4)?;

    if headers_end > payload_end || payload_end > buf.len() {
        return None;
    }

    let headers = parse_headers(&buf[headers_start..headers_end]);
    let payload = buf[headers_end..payload_end].to_vec();

    let event_type = headers
        .iter()
        .find(|h| h.name == ":event-type" || h.name == ":exception-type")
        .map(|h| h.value.clone())
        .unwrap_or_default();

    Some((event_type, payload, total_len))
}

fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    raw.and_then(|s| s.parse().ok()).unwrap_or(StopReason::EndTurn)
}

/// Process a decoded Claude JSON event into zero or more `StreamEvent`s.
fn process_claude_event(event_type: &str, json_data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let mut events = Vec::new();

    match event_type {
        "message_start" => {
            let payload: MessageStartPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("message_start: {e}")))?;
            tracing::trace!(message_id = %payload.message.id, model = %payload.message.model, "bedrock stream started");
            if let Some(usage) = payload.message.usage {
                events.push(StreamEvent::Usage(Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                }));
            }
        }

        "content_block_start" => {
            let payload: ContentBlockStartPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("content_block_start: {e}")))?;
            events.push(StreamEvent::ContentBlockStart {
                index: payload.index,
                content_type: payload.content_block.type_name().to_string(),
            });
        }

        "content_block_delta" => {
            let payload: ContentBlockDeltaPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("content_block_delta: {e}")))?;
            match payload.delta {
                Delta::TextDelta { text } => {
                    events.push(StreamEvent::TextDelta {
                        index: payload.index,
                        text,
                    });
                }
                Delta::Other => {}
            }
        }

        "content_block_stop" => {
            let payload: ContentBlockStopPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("content_block_stop: {e}")))?;
            events.push(StreamEvent::ContentBlockStop {
                index: payload.index,
            });
        }

        "message_delta" => {
            let payload: MessageDeltaPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("message_delta: {e}")))?;
            events.push(StreamEvent::Usage(Usage {
                input_tokens: payload.usage.input_tokens,
                output_tokens: payload.usage.output_tokens,
            }));
            events.push(StreamEvent::MessageDelta {
                stop_reason: parse_stop_reason(payload.delta.stop_reason.as_deref()),
            });
        }

        "message_stop" => {
            events.push(StreamEvent::Done);
        }

        "ping" => {}

        "error" => {
            let payload: ErrorPayload = serde_json::from_str(json_data)
                .map_err(|e| LlmError::Deserialization(format!("error event: {e}")))?;
            let err = match payload.error.error_type.as_str() {
                "overloaded_error" => LlmError::Overloaded(payload.error.message),
                "rate_limit_error" => LlmError::RateLimited {
                    retry_after_ms: None,
                },
                "authentication_error" => LlmError::AuthenticationFailed,
                _ => LlmError::Provider {
                    message: payload.error.message,
                },
            };
            return Err(err);
        }

        unknown => {
            tracing::warn!(event_type = unknown, "unknown Bedrock stream event type, skipping");
        }
    }

    Ok(events)
}

/// Decode one `chunk` frame payload into stream events.
fn decode_chunk(payload: &[u8]) -> Result<Vec<StreamEvent>, LlmError> {
    let stream_chunk: BedrockStreamChunk = serde_json::from_slice(payload)
        .map_err(|e| LlmError::Deserialization(format!("bedrock chunk wrapper: {e}")))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&stream_chunk.bytes)
        .map_err(|e| LlmError::Deserialization(format!("base64 decode: {e}")))?;

    let json_str = String::from_utf8(decoded)
        .map_err(|e| LlmError::Deserialization(format!("utf8 decode: {e}")))?;

    let event_json: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| LlmError::Deserialization(format!("inner json: {e}")))?;

    let inner_type = event_json
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    process_claude_event(inner_type, &json_str)
}

/// Create a streaming connection to the AWS Bedrock Runtime API.
///
/// Sends the HTTP request, checks the response status, then reads the
/// binary event stream body. Exception frames (`:exception-type`) end the
/// stream with an error.
pub fn create_bedrock_stream(
    endpoint: BedrockEndpoint,
    url: String,
    body: BedrockRequest,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
    Box::pin(async_stream::try_stream! {
        let response = endpoint.post_json(&url, &body).await?;

        yield StreamEvent::Connected;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::Stream(format!("response body read: {e}")))?;
            buffer.extend_from_slice(&chunk);

            // Parse as many complete frames as possible from the buffer
            while let Some((event_type, payload, consumed)) = parse_event_stream_frame(&buffer) {
                buffer.drain(..consumed);

                match event_type.as_str() {
                    "chunk" => {
                        for ev in decode_chunk(&payload)? {
                            yield ev;
                        }
                    }
                    "" => {}
                    other if other.ends_with("Exception") => {
                        let message = String::from_utf8_lossy(&payload).to_string();
                        Err(LlmError::Stream(format!("{other}: {message}")))?;
                    }
                    other => {
                        tracing::debug!(event_type = %other, "non-chunk bedrock frame, skipping");
                    }
                }
            }
        }
    })
}
