//! Tool trait and types.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for tool execution.
///
/// Never crosses the executor boundary; it is rendered into an
/// error-flagged [`ToolOutcome`] so the model can react to it.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Request timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    NotAuthorized(String),

    #[error("{message}")]
    ExternalService { status: Option<u16>, message: String },
}

impl ToolError {
    /// HTTP-style status carried by network failures, for logging.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ToolError::Timeout(_) => Some(408),
            ToolError::ExternalService { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::ExecutionFailed(err.to_string())
    }
}

/// Output from a tool that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    /// The tool ran but the result should be read as a failure.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id assigned by the provider.
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Result of executing one [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Typed parameter set for one tool.
pub trait ToolParams: DeserializeOwned + Send + 'static {
    /// Keys that must be present (and non-null) in the raw input.
    const REQUIRED: &'static [&'static str];

    /// Validate and deserialize raw model input.
    ///
    /// Missing keys are reported before deserialization so the model sees
    /// which parameter it forgot rather than a serde message.
    fn from_input(input: &serde_json::Value) -> Result<Self, ToolError> {
        let object = input.as_object().ok_or_else(|| {
            ToolError::InvalidParameters("tool input must be a JSON object".to_string())
        })?;

        for key in Self::REQUIRED {
            if object.get(*key).is_none_or(|v| v.is_null()) {
                return Err(ToolError::MissingParameter((*key).to_string()));
            }
        }

        serde_json::from_value(input.clone())
            .map_err(|e| ToolError::InvalidParameters(e.to_string()))
    }
}

/// Trait for tools that the model can use.
#[async_trait]
pub trait Tool: Send + Sync {
    type Params: ToolParams;

    /// Get the tool name.
    fn name(&self) -> &'static str;

    /// Get a description of what the tool does.
    fn description(&self) -> &'static str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with validated parameters.
    async fn execute(&self, params: Self::Params) -> Result<ToolOutput, ToolError>;

    /// Get the spec sent to the model.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}
