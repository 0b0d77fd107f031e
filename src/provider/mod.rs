//! Provider capability contract and registry.
//!
//! Backend adapters (HTTP clients for Ollama, Anthropic, OpenAI, ...) live
//! outside this crate. The routing core only ever talks to them through
//! [`ProviderPort`].

mod configured;
pub mod registry;
mod types;

pub use configured::ConfiguredProvider;
pub use registry::ProviderRegistry;
pub use types::{
    CompletionRequest, CompletionResponse, HealthStatus, Message, ProviderInfo, StreamChunk, Usage,
};

use async_trait::async_trait;

use crate::error::Result;

/// Capability set every backend adapter implements.
///
/// Every async method may block on network I/O for arbitrarily long. The
/// routing core never imposes its own timeout; it races these futures
/// against the caller's cancellation token and drops them when cancelled.
#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Static identity, no I/O.
    fn info(&self) -> ProviderInfo;

    /// Model ids this provider can serve.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Whether the provider is configured to serve a model.
    async fn supports_model(&self, model_id: &str) -> Result<bool>;

    /// Whether the provider can serve a model right now (health, capacity,
    /// rate limits).
    async fn is_available(&self, model_id: &str) -> Result<bool>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streams a completion, invoking `on_chunk` for every piece received.
    async fn stream(
        &self,
        request: CompletionRequest,
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<CompletionResponse>;

    /// Check provider health. An empty `model_id` is a general liveness check.
    async fn health_check(&self, model_id: &str) -> Result<HealthStatus>;
}
