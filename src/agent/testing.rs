//! Scripted collaborators for engine, job, and server tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::LlmError;
use crate::llm::{ContentBlock, LlmProvider, MessagesRequest, MessagesResponse, StopReason, Usage};
use crate::tools::{ToolDispatch, ToolInvocation, ToolOutcome, ToolSpec};

pub fn end_turn(text: &str, input_tokens: u64, output_tokens: u64) -> MessagesResponse {
    MessagesResponse {
        content: vec![ContentBlock::text(text)],
        stop_reason: StopReason::EndTurn,
        usage: Usage {
            input_tokens,
            output_tokens,
        },
    }
}

pub fn tool_turn(tools: &[(&str, &str)], input_tokens: u64, output_tokens: u64) -> MessagesResponse {
    MessagesResponse {
        content: tools
            .iter()
            .map(|(name, id)| ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: serde_json::json!({"command": "true"}),
            })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: Usage {
            input_tokens,
            output_tokens,
        },
    }
}

pub fn text_then_tools(
    text: &str,
    tools: &[(&str, &str)],
    input_tokens: u64,
    output_tokens: u64,
) -> MessagesResponse {
    let mut response = tool_turn(tools, input_tokens, output_tokens);
    response.content.insert(0, ContentBlock::text(text));
    response
}

/// Provider that replays a fixed script of responses.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<MessagesResponse, LlmError>>>,
    repeat: Option<MessagesResponse>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<MessagesRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<MessagesResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            delay: None,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Return `response` on every call.
    pub fn repeating(response: MessagesResponse) -> Self {
        let mut llm = Self::new(Vec::new());
        llm.repeat = Some(response);
        llm
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each call waits for one permit, letting a test step the run.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn request(&self, index: usize) -> MessagesRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "claude-3-5-sonnet-v2@20241022"
    }

    async fn create_message(&self, req: MessagesRequest) -> Result<MessagesResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => self.repeat.clone().ok_or_else(|| LlmError::InvalidResponse {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            }),
        }
    }
}

/// Tool dispatcher that records calls instead of running anything.
#[derive(Default)]
pub struct StubTools {
    failing: Option<String>,
    invoked: Mutex<Vec<String>>,
}

impl StubTools {
    pub fn failing(name: &str) -> Self {
        Self {
            failing: Some(name.to_string()),
            invoked: Mutex::new(Vec::new()),
        }
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolDispatch for StubTools {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "bash".into(),
            description: "Run a command".into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }]
    }

    async fn dispatch(&self, invocation: &ToolInvocation) -> ToolOutcome {
        self.invoked.lock().unwrap().push(invocation.name.clone());
        let is_error = self.failing.as_deref() == Some(invocation.name.as_str());
        ToolOutcome {
            tool_use_id: invocation.id.clone(),
            content: if is_error {
                format!("{} blew up", invocation.name)
            } else {
                format!("ran {}", invocation.name)
            },
            is_error,
        }
    }
}
