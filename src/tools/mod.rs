//! Tool system.
//!
//! Tools are the model's interface to the job's working directory and the
//! network. The registry fixes the catalog, the executor validates each call
//! into a typed [`ToolInput`] and converts every failure into an error
//! outcome so one bad call never aborts a conversation.

pub mod builtin;

mod executor;
mod registry;
mod tool;

pub use executor::{ToolDispatch, ToolExecutor};
pub use registry::{ToolInput, ToolRegistry};
pub use tool::{Tool, ToolError, ToolInvocation, ToolOutcome, ToolOutput, ToolParams, ToolSpec};
