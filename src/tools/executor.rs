//! Tool executor: turns model tool calls into outcomes.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::ToolsConfig;
use crate::tools::registry::{ToolInput, ToolRegistry};
use crate::tools::tool::{ToolError, ToolInvocation, ToolOutcome, ToolSpec};

/// Seam between the conversation engine and whatever runs tools.
///
/// Implementations must not fail: every problem becomes an error-flagged
/// [`ToolOutcome`] that is shown to the model.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Tools offered to the model.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Execute one invocation.
    async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutcome;
}

/// Executes tools against one job's working directory.
#[derive(Debug)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(working_dir: PathBuf, config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            registry: ToolRegistry::new(working_dir, config)?,
        })
    }

    async fn try_execute(&self, invocation: &ToolInvocation) -> Result<ToolOutcome, ToolError> {
        let input = ToolInput::parse(&invocation.name, &invocation.input)?;
        let output = self.registry.run(input).await?;
        Ok(ToolOutcome {
            tool_use_id: invocation.id.clone(),
            content: output.content,
            is_error: output.is_error,
        })
    }
}

#[async_trait]
impl ToolDispatch for ToolExecutor {
    fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let start = Instant::now();
        tracing::info!(tool = %invocation.name, tool_use_id = %invocation.id, "Executing tool");
        tracing::debug!(tool = %invocation.name, input = %invocation.input, "Tool input");

        let outcome = match self.try_execute(invocation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    tool = %invocation.name,
                    status = ?e.status_code(),
                    "Tool failed: {}",
                    e
                );
                ToolOutcome {
                    tool_use_id: invocation.id.clone(),
                    content: e.to_string(),
                    is_error: true,
                }
            }
        };

        tracing::debug!(
            tool = %invocation.name,
            is_error = outcome.is_error,
            bytes = outcome.content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool finished"
        );
        outcome
    }
}
