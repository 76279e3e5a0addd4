//! Generative backend trait definition

use crate::{Generation, GenerationRequest, Result};
use async_trait::async_trait;

/// Trait for generative backends
///
/// Implementations adapt a concrete model service to the normalized
/// `{ text, tool_requests }` shape. They must honor
/// [`ToolMode::Forbidden`](crate::ToolMode::Forbidden): a forbidden request
/// never yields tool requests.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the next turn for the request's role
    async fn generate(&self, request: GenerationRequest) -> Result<Generation>;

    /// Get the backend name (e.g., "openai", "scripted")
    fn name(&self) -> &str;
}
