//! Hosted agent API boundary.
//!
//! The research assistant never talks to a language model directly. It registers
//! an agent definition, appends messages to a thread, starts runs, and answers
//! the tool calls a run asks for. [`AssistantsApi`] is the seam; the production
//! implementation is [`OpenAiAssistants`].

mod openai;
mod types;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiAssistants;
pub use types::{
    AgentDefinition, Assistant, FunctionCall, FunctionDescriptor, LastError, MessageContent,
    MessageRole, RequiredAction, Run, RunStatus, SubmitToolOutputsAction, TextContent, Thread,
    ThreadMessage, ToolCall, ToolDescriptor, ToolOutput,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to assistants API failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Assistants API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected assistants API response: {0}")]
    Decode(String),
}

/// Operations consumed from the hosted agent API.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    /// Register an agent definition and return it with its id.
    async fn create_assistant(&self, definition: &AgentDefinition) -> Result<Assistant, ApiError>;

    async fn create_thread(&self) -> Result<Thread, ApiError>;

    /// Append a message to a thread.
    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, ApiError>;

    /// Start a run of `assistant_id` against `thread_id`.
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError>;

    /// Submit one output per pending tool call as a single batch.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError>;

    /// Messages of a thread, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError>;
}
