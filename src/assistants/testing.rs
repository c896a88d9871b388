//! Scripted in-memory [`AssistantsApi`] for driver, session and router tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{
    AgentDefinition, Assistant, FunctionCall, MessageContent, MessageRole, RequiredAction, Run,
    RunStatus, SubmitToolOutputsAction, TextContent, Thread, ThreadMessage, ToolCall, ToolOutput,
};
use super::{ApiError, AssistantsApi};

pub(crate) fn run(id: &str, status: RunStatus) -> Run {
    Run {
        id: id.to_string(),
        status,
        required_action: None,
        last_error: None,
    }
}

pub(crate) fn requires_action(id: &str, calls: &[(&str, &str, &str)]) -> Run {
    let tool_calls = calls
        .iter()
        .map(|(call_id, name, arguments)| ToolCall {
            id: call_id.to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        })
        .collect();
    Run {
        required_action: Some(RequiredAction {
            submit_tool_outputs: Some(SubmitToolOutputsAction { tool_calls }),
        }),
        ..run(id, RunStatus::RequiresAction)
    }
}

#[derive(Default)]
struct Script {
    /// Statuses handed out by `retrieve_run`; the last one repeats.
    polls: VecDeque<Run>,
    reply: Option<String>,
    definitions: Vec<AgentDefinition>,
    messages: Vec<ThreadMessage>,
    created_runs: Vec<String>,
    submissions: Vec<Vec<ToolOutput>>,
    retrievals: usize,
}

#[derive(Default)]
pub(crate) struct ScriptedAssistants {
    script: Mutex<Script>,
}

impl ScriptedAssistants {
    pub(crate) fn new(polls: Vec<Run>, reply: Option<&str>) -> Self {
        Self {
            script: Mutex::new(Script {
                polls: polls.into(),
                reply: reply.map(str::to_string),
                ..Script::default()
            }),
        }
    }

    /// Replace the pending reply. The previous reply stays in the thread as an
    /// earlier assistant message.
    pub(crate) fn set_reply(&self, reply: &str) {
        let mut script = self.script.lock().unwrap();
        if let Some(previous) = script.reply.replace(reply.to_string()) {
            let n = script.messages.len();
            let msg = message(
                format!("msg_{}", n),
                MessageRole::Assistant,
                &previous,
                n as i64,
            );
            script.messages.push(msg);
        }
    }

    pub(crate) fn definitions(&self) -> Vec<AgentDefinition> {
        self.script.lock().unwrap().definitions.clone()
    }

    /// `(role, text)` of every message in the thread, excluding the pending reply.
    pub(crate) fn appended_messages(&self) -> Vec<(MessageRole, String)> {
        self.script
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|m| (m.role, m.text()))
            .collect()
    }

    pub(crate) fn created_runs(&self) -> Vec<String> {
        self.script.lock().unwrap().created_runs.clone()
    }

    pub(crate) fn submissions(&self) -> Vec<Vec<ToolOutput>> {
        self.script.lock().unwrap().submissions.clone()
    }

    pub(crate) fn retrievals(&self) -> usize {
        self.script.lock().unwrap().retrievals
    }
}

fn message(id: String, role: MessageRole, text: &str, created_at: i64) -> ThreadMessage {
    ThreadMessage {
        id,
        role,
        content: vec![MessageContent::Text {
            text: TextContent {
                value: text.to_string(),
            },
        }],
        created_at,
    }
}

#[async_trait]
impl AssistantsApi for ScriptedAssistants {
    async fn create_assistant(&self, definition: &AgentDefinition) -> Result<Assistant, ApiError> {
        self.script
            .lock()
            .unwrap()
            .definitions
            .push(definition.clone());
        Ok(Assistant {
            id: "asst_test".to_string(),
            name: Some(definition.name.clone()),
            model: Some(definition.model.clone()),
        })
    }

    async fn create_thread(&self) -> Result<Thread, ApiError> {
        Ok(Thread {
            id: "thread_test".to_string(),
        })
    }

    async fn create_message(
        &self,
        _thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, ApiError> {
        let mut script = self.script.lock().unwrap();
        let n = script.messages.len();
        let msg = message(format!("msg_{}", n), role, content, n as i64);
        script.messages.push(msg.clone());
        Ok(msg)
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.created_runs.push(thread_id.to_string());
        let id = format!("run_{}", script.created_runs.len());
        Ok(run(&id, RunStatus::Queued))
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.retrievals += 1;
        let next = if script.polls.len() > 1 {
            script.polls.pop_front()
        } else {
            script.polls.front().cloned()
        };
        let mut next = next.ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("No run found with id '{}'.", run_id),
        })?;
        next.id = run_id.to_string();
        Ok(next)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError> {
        self.script
            .lock()
            .unwrap()
            .submissions
            .push(outputs.to_vec());
        Ok(run(run_id, RunStatus::Queued))
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError> {
        let script = self.script.lock().unwrap();
        let mut messages = script.messages.clone();
        if let Some(reply) = &script.reply {
            let n = messages.len();
            messages.push(message(
                format!("msg_{}", n),
                MessageRole::Assistant,
                reply,
                n as i64,
            ));
        }
        Ok(messages)
    }
}
