//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{ToolCallRecord, Turn};

/// Request to open a research session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// OpenAI API key for this session (falls back to `OPENAI_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Response after opening a session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    /// Session identifier used in all further requests
    pub id: Uuid,

    /// Agent definition registered for this session
    pub assistant_id: String,

    /// Conversation thread of this session
    pub thread_id: String,
}

/// A free-text research request.
#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// Download affordance for the saved research file.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadInfo {
    pub label: String,
    pub message: String,
    pub url: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Result of one research turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub run_id: String,

    /// Newest assistant message
    pub answer: String,

    /// Tool calls answered during the run, in order
    pub tool_calls: Vec<ToolCallRecord>,

    /// Present when the run saved the research file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<DownloadInfo>,
}

impl TurnResponse {
    pub fn from_turn(session_id: Uuid, turn: Turn) -> Self {
        let download = turn.saved_file.map(|file| DownloadInfo {
            label: "Download saved research".to_string(),
            message: "The file is ready. Use the download link to save it.".to_string(),
            url: format!("/api/sessions/{}/download", session_id),
            file_name: file.file_name,
            mime_type: file.mime_type.to_string(),
        });
        Self {
            run_id: turn.run_id,
            answer: turn.answer,
            tool_calls: turn.tool_calls,
            download,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
