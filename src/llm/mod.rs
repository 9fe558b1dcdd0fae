//! Model provider integration.
//!
//! The conversation engine only sees [`LlmProvider`]; the Vertex provider is
//! the one production backend.

mod pricing;
mod provider;
mod vertex;

pub use pricing::Pricing;
pub use provider::{
    ChatMessage, ContentBlock, LlmProvider, MessagesRequest, MessagesResponse, Role, StopReason,
    Usage, cost_for,
};
pub use vertex::VertexProvider;

use std::sync::Arc;

use crate::config::VertexConfig;
use crate::error::LlmError;

/// Create the configured provider.
pub fn create_llm_provider(config: &VertexConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    tracing::info!(
        project = %config.project_id,
        region = %config.region,
        model = %config.model,
        "Using Claude on Vertex AI"
    );
    Ok(Arc::new(VertexProvider::new(config.clone())?))
}
