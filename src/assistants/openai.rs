//! OpenAI Assistants (v2) client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::types::{
    AgentDefinition, Assistant, MessageRole, Run, Thread, ThreadMessage, ToolOutput,
};
use super::{ApiError, AssistantsApi};

/// Page size when reading back a thread. Only the newest assistant reply matters.
const MESSAGE_PAGE_LIMIT: u32 = 20;

#[derive(Serialize)]
struct CreateMessageRequest<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: &'a [ToolOutput],
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// reqwest-backed implementation of [`AssistantsApi`].
#[derive(Clone)]
pub struct OpenAiAssistants {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiAssistants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAssistants")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiAssistants {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("research-assistant/0.1")
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.authorize(request).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| truncate(&body, 500));
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// The API pages newest first; callers expect oldest first.
fn chronological(page: MessageList) -> Vec<ThreadMessage> {
    let mut messages = page.data;
    messages.reverse();
    messages
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... [truncated]", head)
    }
}

#[async_trait]
impl AssistantsApi for OpenAiAssistants {
    async fn create_assistant(&self, definition: &AgentDefinition) -> Result<Assistant, ApiError> {
        tracing::debug!(name = %definition.name, model = %definition.model, "Creating assistant");
        self.send(self.client.post(self.url("assistants")).json(definition))
            .await
    }

    async fn create_thread(&self) -> Result<Thread, ApiError> {
        self.send(self.client.post(self.url("threads")).json(&json!({})))
            .await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ThreadMessage, ApiError> {
        let body = CreateMessageRequest { role, content };
        self.send(
            self.client
                .post(self.url(&format!("threads/{}/messages", thread_id)))
                .json(&body),
        )
        .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError> {
        let body = CreateRunRequest { assistant_id };
        self.send(
            self.client
                .post(self.url(&format!("threads/{}/runs", thread_id)))
                .json(&body),
        )
        .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        self.send(
            self.client
                .get(self.url(&format!("threads/{}/runs/{}", thread_id, run_id))),
        )
        .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ApiError> {
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs,
        };
        self.send(
            self.client
                .post(self.url(&format!(
                    "threads/{}/runs/{}/submit_tool_outputs",
                    thread_id, run_id
                )))
                .json(&body),
        )
        .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError> {
        let limit = MESSAGE_PAGE_LIMIT.to_string();
        let page: MessageList = self
            .send(
                self.client
                    .get(self.url(&format!("threads/{}/messages", thread_id)))
                    .query(&[("order", "desc"), ("limit", limit.as_str())]),
            )
            .await?;

        Ok(chronological(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = OpenAiAssistants::new("sk-test", "https://api.openai.com/v1/");
        assert_eq!(
            api.url("threads/t_1/runs"),
            "https://api.openai.com/v1/threads/t_1/runs"
        );
    }

    #[test]
    fn debug_output_hides_api_key() {
        let api = OpenAiAssistants::new("sk-secret", "https://api.openai.com/v1");
        let rendered = format!("{:?}", api);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("api.openai.com"));
    }

    #[test]
    fn submit_body_matches_api_shape() {
        let outputs = vec![ToolOutput {
            tool_call_id: "call_1".to_string(),
            output: "summary".to_string(),
        }];
        let body = serde_json::to_value(SubmitToolOutputsRequest {
            tool_outputs: &outputs,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"tool_outputs": [{"tool_call_id": "call_1", "output": "summary"}]})
        );
    }

    #[test]
    fn newest_first_page_is_returned_oldest_first() {
        let page: MessageList = serde_json::from_value(json!({
            "object": "list",
            "data": [
                {"id": "msg_3", "role": "assistant", "created_at": 3,
                 "content": [{"type": "text", "text": {"value": "second answer", "annotations": []}}]},
                {"id": "msg_2", "role": "user", "created_at": 2,
                 "content": [{"type": "text", "text": {"value": "follow-up", "annotations": []}}]},
                {"id": "msg_1", "role": "assistant", "created_at": 1,
                 "content": [{"type": "text", "text": {"value": "first answer", "annotations": []}}]}
            ],
            "has_more": false
        }))
        .unwrap();

        let messages = chronological(page);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["msg_1", "msg_2", "msg_3"]);
        assert_eq!(messages.last().unwrap().text(), "second answer");
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(600);
        let out = truncate(&body, 500);
        assert!(out.ends_with("... [truncated]"));
        assert_eq!(out.chars().filter(|c| *c == 'x').count(), 500);
    }
}
