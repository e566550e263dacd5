//! Type-erased [`LlmProvider`].
//!
//! `LlmProvider::complete` returns an opaque future, which keeps the trait
//! out of `dyn` position. `ErasedProvider` is the object-safe mirror with a
//! boxed future, blanket-implemented for every provider.

use std::future::Future;
use std::pin::Pin;

use lorekeeper_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::provider::{EventStream, LlmProvider};

type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;

trait ErasedProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete_erased<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;

    fn stream_erased(&self, request: CompletionRequest) -> EventStream;
}

impl<T: LlmProvider> ErasedProvider for T {
    fn name(&self) -> &str {
        LlmProvider::name(self)
    }

    fn complete_erased<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.complete(request))
    }

    fn stream_erased(&self, request: CompletionRequest) -> EventStream {
        self.stream(request)
    }
}

/// The provider the orchestrator talks to, chosen at start-up.
pub struct BoxLlmProvider {
    inner: Box<dyn ErasedProvider>,
}

impl BoxLlmProvider {
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_erased(request).await
    }

    pub fn stream(&self, request: CompletionRequest) -> EventStream {
        self.inner.stream_erased(request)
    }
}

impl std::fmt::Debug for BoxLlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmProvider")
            .field("name", &self.name())
            .finish()
    }
}
