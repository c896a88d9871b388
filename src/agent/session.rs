//! Research sessions.
//!
//! A session owns one agent definition and one thread on the hosted API, the
//! transcript shown to the user, and the id of the most recent run. Sessions
//! are independent of each other; the [`SessionStore`] only indexes them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::assistants::{AgentDefinition, ApiError, AssistantsApi, MessageRole, RunStatus};
use crate::config::PollConfig;
use crate::tools::{SavedFile, ToolRegistry};

use super::run_driver::{RunDriver, RunError, ToolCallRecord};

/// Canned research request offered next to the free-text input.
pub const PRESET_PROMPT: &str = "Research about the XZ backdoor";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Previous run still active: {status}")]
    RunStillActive { run_id: String, status: RunStatus },

    #[error("Message content is required")]
    EmptyMessage,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Run(#[from] RunError),
}

/// A transcript entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Result of one user turn.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub run_id: String,
    pub answer: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Set when the run saved the research file.
    pub saved_file: Option<SavedFile>,
}

pub struct ResearchSession {
    id: Uuid,
    assistant_id: String,
    thread_id: String,
    api: Arc<dyn AssistantsApi>,
    driver: RunDriver,
    transcript: RwLock<Vec<ChatMessage>>,
    active_run: RwLock<Option<String>>,
    saved_file: RwLock<Option<SavedFile>>,
}

impl ResearchSession {
    /// Register the agent definition and open a thread.
    pub async fn start(
        api: Arc<dyn AssistantsApi>,
        tools: Arc<ToolRegistry>,
        definition: &AgentDefinition,
        poll: PollConfig,
    ) -> Result<Self, SessionError> {
        let assistant = api.create_assistant(definition).await?;
        let thread = api.create_thread().await?;
        let id = Uuid::new_v4();

        tracing::info!(
            session_id = %id,
            assistant_id = %assistant.id,
            thread_id = %thread.id,
            "Started research session"
        );

        Ok(Self {
            id,
            assistant_id: assistant.id,
            thread_id: thread.id,
            driver: RunDriver::new(api.clone(), tools, poll),
            api,
            transcript: RwLock::new(Vec::new()),
            active_run: RwLock::new(None),
            saved_file: RwLock::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.read().await.clone()
    }

    pub async fn active_run(&self) -> Option<String> {
        self.active_run.read().await.clone()
    }

    /// The last file this session saved, if any.
    pub async fn saved_file(&self) -> Option<SavedFile> {
        self.saved_file.read().await.clone()
    }

    /// Run one research turn.
    ///
    /// Refuses with [`SessionError::RunStillActive`] while the previous run is
    /// not terminal. The check is advisory: two turns racing past it can both
    /// start runs.
    pub async fn ask(&self, text: &str) -> Result<Turn, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.ensure_no_active_run().await?;

        self.api
            .create_message(&self.thread_id, MessageRole::User, text)
            .await?;
        self.transcript
            .write()
            .await
            .push(ChatMessage::new(MessageRole::User, text));

        let run = self
            .api
            .create_run(&self.thread_id, &self.assistant_id)
            .await?;
        *self.active_run.write().await = Some(run.id.clone());
        tracing::info!(session_id = %self.id, run_id = %run.id, "Created run");

        let report = self.driver.drive(&self.thread_id, &run.id).await?;

        let saved_file = report.saved_files.last().cloned();
        if let Some(file) = &saved_file {
            *self.saved_file.write().await = Some(file.clone());
        }
        self.transcript
            .write()
            .await
            .push(ChatMessage::new(MessageRole::Assistant, report.answer.clone()));

        Ok(Turn {
            run_id: report.run_id,
            answer: report.answer,
            tool_calls: report.tool_calls,
            saved_file,
        })
    }

    async fn ensure_no_active_run(&self) -> Result<(), SessionError> {
        let Some(run_id) = self.active_run().await else {
            return Ok(());
        };

        let run = self.api.retrieve_run(&self.thread_id, &run_id).await?;
        if run.status.is_terminal() {
            return Ok(());
        }

        tracing::warn!(
            session_id = %self.id,
            run_id = %run_id,
            status = %run.status,
            "Previous run still active"
        );
        Err(SessionError::RunStillActive {
            run_id,
            status: run.status,
        })
    }
}

/// Live sessions keyed by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<ResearchSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: ResearchSession) -> Arc<ResearchSession> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .await
            .insert(session.id(), session.clone());
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<ResearchSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
