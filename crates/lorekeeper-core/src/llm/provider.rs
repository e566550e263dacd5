//! LlmProvider trait definition.

use std::pin::Pin;

use futures_util::Stream;

use lorekeeper_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Boxed event stream of a synthesis call. Owns everything it needs, so it
/// can outlive the request that started it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Text-generation backend.
///
/// The agent loop makes two shapes of call: `complete` for planning (one
/// response, possibly carrying tool calls) and `stream` for synthesis.
///
/// Implementations live in lorekeeper-infra (e.g., `BedrockProvider`).
pub trait LlmProvider: Send + Sync {
    /// Short backend name, recorded as `gen_ai.system` on model spans.
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    fn stream(&self, request: CompletionRequest) -> EventStream;
}
