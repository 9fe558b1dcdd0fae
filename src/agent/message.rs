//! Transcript events and run results.

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// One event in a job's transcript, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationMessage {
    /// The prompt that started the run.
    User { content: String },
    Text { content: String },
    ToolUse {
        tool_name: String,
        tool_use_id: String,
        tool_input: serde_json::Value,
    },
    ToolResult {
        tool_name: String,
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    Thinking { content: String },
    /// Always the last message of a run.
    Result {
        success: bool,
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
    },
}

impl ConversationMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ConversationMessage::User { .. } => "user",
            ConversationMessage::Text { .. } => "text",
            ConversationMessage::ToolUse { .. } => "tool_use",
            ConversationMessage::ToolResult { .. } => "tool_result",
            ConversationMessage::Thinking { .. } => "thinking",
            ConversationMessage::Result { .. } => "result",
        }
    }
}

/// Terminal outcome of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRunResult {
    /// Text fragments of the run joined by newlines; thinking excluded.
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl AgentRunResult {
    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_wire_shape() {
        let msg = ConversationMessage::ToolResult {
            tool_name: "bash".into(),
            tool_use_id: "toolu_9".into(),
            content: "ok".into(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({
                "type": "tool_result",
                "tool_name": "bash",
                "tool_use_id": "toolu_9",
                "content": "ok",
                "is_error": false
            })
        );

        let done = ConversationMessage::Result {
            success: true,
            output: "done".into(),
            error: None,
            input_tokens: 1,
            output_tokens: 2,
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "result");
        assert!(json.get("error").is_none());
        assert_eq!(done.kind(), "result");
    }
}
