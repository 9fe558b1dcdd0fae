//! Conversation engine: the bounded model/tool loop for one run.
//!
//! Each iteration sends the full history to the model, classifies the
//! returned blocks, runs requested tools in order, and feeds their results
//! back. The run ends on a natural stop, a provider error, cancellation, or
//! the iteration bound. Every emitted [`ConversationMessage`] goes to the
//! run's sink before the step that produced it completes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::message::{AgentRunResult, ConversationMessage};
use crate::config::AgentConfig;
use crate::llm::{
    ChatMessage, ContentBlock, LlmProvider, MessagesRequest, StopReason, Usage,
};
use crate::tools::{ToolDispatch, ToolInvocation};

/// Receives every message as it is emitted.
pub type MessageSink = mpsc::UnboundedSender<ConversationMessage>;

pub const CANCELLED_ERROR: &str = "Job cancelled";

/// Per-run plumbing supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub sink: Option<MessageSink>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(sink: MessageSink, cancel: CancellationToken) -> Self {
        Self {
            sink: Some(sink),
            cancel,
        }
    }
}

/// Drives the model/tool protocol.
pub struct ConversationEngine {
    llm: Arc<dyn LlmProvider>,
    max_iterations: u32,
    max_tokens: u32,
}

/// Mutable state of one run.
struct RunState<'a> {
    ctx: &'a RunContext,
    messages: Vec<ConversationMessage>,
    text_parts: Vec<String>,
    usage: Usage,
}

impl RunState<'_> {
    fn emit(&mut self, message: ConversationMessage) {
        match &message {
            ConversationMessage::ToolUse {
                tool_name,
                tool_use_id,
                ..
            }
            | ConversationMessage::ToolResult {
                tool_name,
                tool_use_id,
                ..
            } => {
                tracing::debug!(kind = message.kind(), tool = %tool_name, tool_use_id = %tool_use_id, "Transcript");
            }
            _ => tracing::debug!(kind = message.kind(), "Transcript"),
        }

        if let Some(sink) = &self.ctx.sink {
            // A closed receiver only means nobody is listening any more.
            let _ = sink.send(message.clone());
        }
        self.messages.push(message);
    }

    fn finish(mut self, error: Option<String>) -> AgentRunResult {
        let output = self.text_parts.join("\n");
        let success = error.is_none();
        self.emit(ConversationMessage::Result {
            success,
            output: output.clone(),
            error: error.clone(),
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
        });

        AgentRunResult {
            output,
            success,
            error,
            messages: self.messages,
            input_tokens: self.usage.input_tokens,
            output_tokens: self.usage.output_tokens,
        }
    }
}

impl ConversationEngine {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &AgentConfig) -> Self {
        Self {
            llm,
            max_iterations: config.max_iterations,
            max_tokens: config.max_tokens,
        }
    }

    /// Run one conversation to a terminal state. Never fails; errors are
    /// reported in the returned result.
    pub async fn run(
        &self,
        system_prompt: &str,
        prompt: &str,
        tools: &dyn ToolDispatch,
        ctx: &RunContext,
    ) -> AgentRunResult {
        let mut state = RunState {
            ctx,
            messages: Vec::new(),
            text_parts: Vec::new(),
            usage: Usage::default(),
        };

        state.emit(ConversationMessage::User {
            content: prompt.to_string(),
        });

        let specs = tools.specs();
        let mut history = vec![ChatMessage::user(vec![ContentBlock::text(prompt)])];

        for iteration in 1..=self.max_iterations {
            if ctx.cancel.is_cancelled() {
                return state.finish(Some(CANCELLED_ERROR.to_string()));
            }

            tracing::info!(
                iteration,
                max_iterations = self.max_iterations,
                model = self.llm.model_name(),
                "Calling model"
            );

            let request = MessagesRequest {
                system: system_prompt.to_string(),
                messages: history.clone(),
                tools: specs.clone(),
                max_tokens: self.max_tokens,
            };

            let response = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return state.finish(Some(CANCELLED_ERROR.to_string()));
                }
                result = self.llm.create_message(request) => result,
            };

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(iteration, "Model call failed: {}", e);
                    return state.finish(Some(e.to_string()));
                }
            };

            state.usage.input_tokens += response.usage.input_tokens;
            state.usage.output_tokens += response.usage.output_tokens;

            let mut assistant_content = Vec::with_capacity(response.content.len());
            let mut invocations = Vec::new();

            for block in response.content {
                match block {
                    ContentBlock::Text { text } => {
                        state.text_parts.push(text.clone());
                        state.emit(ConversationMessage::Text {
                            content: text.clone(),
                        });
                        assistant_content.push(ContentBlock::Text { text });
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        state.emit(ConversationMessage::ToolUse {
                            tool_name: name.clone(),
                            tool_use_id: id.clone(),
                            tool_input: input.clone(),
                        });
                        invocations.push(ToolInvocation {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        });
                        assistant_content.push(ContentBlock::ToolUse { id, name, input });
                    }
                    ContentBlock::Thinking { thinking, .. } => {
                        state.emit(ConversationMessage::Thinking { content: thinking });
                    }
                    ContentBlock::RedactedThinking { .. } => {
                        state.emit(ConversationMessage::Thinking {
                            content: "[redacted]".to_string(),
                        });
                    }
                    ContentBlock::ToolResult { tool_use_id, .. } => {
                        tracing::warn!(tool_use_id = %tool_use_id, "Ignoring tool_result block from model");
                    }
                }
            }

            if !assistant_content.is_empty() {
                history.push(ChatMessage::assistant(assistant_content));
            }

            if response.stop_reason == StopReason::EndTurn && invocations.is_empty() {
                tracing::info!(iteration, "Conversation complete (end_turn)");
                return state.finish(None);
            }

            if !invocations.is_empty() {
                let mut results = Vec::with_capacity(invocations.len());
                for invocation in &invocations {
                    let outcome = tokio::select! {
                        _ = ctx.cancel.cancelled() => {
                            return state.finish(Some(CANCELLED_ERROR.to_string()));
                        }
                        outcome = tools.dispatch(invocation) => outcome,
                    };

                    state.emit(ConversationMessage::ToolResult {
                        tool_name: invocation.name.clone(),
                        tool_use_id: outcome.tool_use_id.clone(),
                        content: outcome.content.clone(),
                        is_error: outcome.is_error,
                    });
                    results.push(ContentBlock::ToolResult {
                        tool_use_id: outcome.tool_use_id,
                        content: outcome.content,
                        is_error: outcome.is_error,
                    });
                }
                history.push(ChatMessage::user(results));
            }

            if response.stop_reason != StopReason::ToolUse {
                tracing::info!(
                    iteration,
                    stop_reason = %response.stop_reason,
                    "Conversation complete"
                );
                return state.finish(None);
            }
        }

        tracing::warn!("Max iterations ({}) reached", self.max_iterations);
        state.finish(Some(format!(
            "Max iterations ({}) reached without completion",
            self.max_iterations
        )))
    }
}
