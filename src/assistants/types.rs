//! Wire types for the hosted assistants API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool descriptor registered on an agent definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDescriptor {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Request body for registering an agent definition.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<ToolDescriptor>,
}

/// An agent definition as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: String,
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One content part of a thread message. Only text parts are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    #[serde(default)]
    pub created_at: i64,
}

impl ThreadMessage {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                MessageContent::Text { text } => Some(text.value.as_str()),
                MessageContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run status as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Incomplete | Self::Expired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments chosen by the model
    pub arguments: String,
}

/// A tool call emitted by a run in `requires_action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitToolOutputsAction {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredAction {
    #[serde(default)]
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<LastError>,
}

impl Run {
    /// Tool calls awaiting output, in emission order.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        self.required_action
            .as_ref()
            .and_then(|a| a.submit_tool_outputs.as_ref())
            .map(|s| s.tool_calls.as_slice())
            .unwrap_or(&[])
    }

    /// Human-readable failure reason, if the API reported one.
    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(LastError {
                code,
                message: Some(message),
            }) => match code {
                Some(code) => format!("{}: {}", code, message),
                None => message.clone(),
            },
            Some(LastError {
                code: Some(code), ..
            }) => code.clone(),
            _ => "no error details reported".to_string(),
        }
    }
}

/// Output for one tool call, keyed by the call id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_requiring_action_exposes_tool_calls() {
        let run: Run = serde_json::from_value(json!({
            "id": "run_1",
            "object": "thread.run",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search_wikipedia", "arguments": "{\"query\":\"XZ backdoor\"}"}
                    }]
                }
            }
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::RequiresAction);
        let calls = run.pending_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "search_wikipedia");
    }

    #[test]
    fn unrecognised_status_is_unknown_and_not_terminal() {
        let run: Run = serde_json::from_value(json!({"id": "r", "status": "paused"})).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal());
        assert!(run.pending_tool_calls().is_empty());
    }

    #[test]
    fn message_text_skips_non_text_parts() {
        let msg: ThreadMessage = serde_json::from_value(json!({
            "id": "msg_1",
            "role": "assistant",
            "created_at": 10,
            "content": [
                {"type": "image_file", "image_file": {"file_id": "f"}},
                {"type": "text", "text": {"value": "Summary", "annotations": []}}
            ]
        }))
        .unwrap();
        assert_eq!(msg.text(), "Summary");
    }

    #[test]
    fn failure_reason_prefers_code_and_message() {
        let run: Run = serde_json::from_value(json!({
            "id": "r",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}
        }))
        .unwrap();
        assert_eq!(run.failure_reason(), "rate_limit_exceeded: slow down");
    }
}
