//! Drives a hosted run to completion.
//!
//! The hosted API does not push events, so the driver polls. Idle polls back off
//! exponentially up to a cap; a tool submission resets the delay because the run
//! is expected to move again soon. The whole run is bounded by a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::assistants::{ApiError, AssistantsApi, MessageRole, Run, RunStatus, ToolOutput};
use crate::config::PollConfig;
use crate::tools::{SavedFile, ToolRegistry};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Run {run_id} failed: {reason}")]
    Failed { run_id: String, reason: String },

    #[error("Run {run_id} ended with status {status}")]
    Ended { run_id: String, status: RunStatus },

    #[error("Run {run_id} did not finish within {waited:?}")]
    Timeout { run_id: String, waited: Duration },

    #[error("Run {run_id} requires action but listed no tool calls")]
    MissingToolCalls { run_id: String },

    #[error("Run {run_id} completed without an assistant reply")]
    NoAssistantReply { run_id: String },
}

/// One answered tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool: String,
    pub arguments: String,
    pub output: String,
    pub failed: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub answer: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub saved_files: Vec<SavedFile>,
}

pub struct RunDriver {
    api: Arc<dyn AssistantsApi>,
    tools: Arc<ToolRegistry>,
    poll: PollConfig,
}

impl RunDriver {
    pub fn new(api: Arc<dyn AssistantsApi>, tools: Arc<ToolRegistry>, poll: PollConfig) -> Self {
        Self { api, tools, poll }
    }

    /// Poll `run_id` until it completes, answering every tool call on the way,
    /// then return the newest assistant message.
    pub async fn drive(&self, thread_id: &str, run_id: &str) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let mut delay = self.poll.interval;
        let mut report = RunReport {
            run_id: run_id.to_string(),
            answer: String::new(),
            tool_calls: Vec::new(),
            saved_files: Vec::new(),
        };

        let mut run = self.api.retrieve_run(thread_id, run_id).await?;
        loop {
            tracing::debug!(run_id = %run_id, status = %run.status, "Run status");

            match run.status {
                RunStatus::Completed => break,
                RunStatus::Failed => {
                    return Err(RunError::Failed {
                        run_id: run_id.to_string(),
                        reason: run.failure_reason(),
                    })
                }
                RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete => {
                    return Err(RunError::Ended {
                        run_id: run_id.to_string(),
                        status: run.status,
                    })
                }
                RunStatus::RequiresAction => {
                    let outputs = self.answer_tool_calls(&run, &mut report).await?;
                    self.api
                        .submit_tool_outputs(thread_id, run_id, &outputs)
                        .await?;
                    run = self.api.retrieve_run(thread_id, run_id).await?;
                    delay = self.poll.interval;
                    continue;
                }
                RunStatus::Queued
                | RunStatus::InProgress
                | RunStatus::Cancelling
                | RunStatus::Unknown => {}
            }

            let waited = started.elapsed();
            if waited + delay > self.poll.run_timeout {
                tracing::warn!(run_id = %run_id, ?waited, status = %run.status, "Run timed out");
                return Err(RunError::Timeout {
                    run_id: run_id.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(with_jitter(delay)).await;
            delay = self.poll.next_interval(delay);
            run = self.api.retrieve_run(thread_id, run_id).await?;
        }

        report.answer = self.latest_reply(thread_id, run_id).await?;
        tracing::info!(
            run_id = %run_id,
            tool_calls = report.tool_calls.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run completed"
        );
        Ok(report)
    }

    /// Dispatch every pending call in emission order; one output per call.
    async fn answer_tool_calls(
        &self,
        run: &Run,
        report: &mut RunReport,
    ) -> Result<Vec<ToolOutput>, RunError> {
        let calls = run.pending_tool_calls();
        if calls.is_empty() {
            return Err(RunError::MissingToolCalls {
                run_id: run.id.clone(),
            });
        }

        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            tracing::info!(
                run_id = %run.id,
                call_id = %call.id,
                tool = %call.function.name,
                args = %call.function.arguments,
                "Calling tool"
            );

            let outcome = self
                .tools
                .dispatch(&call.function.name, &call.function.arguments)
                .await;
            let output = outcome.to_output();

            if let Some(file) = outcome.saved_file() {
                report.saved_files.push(file.clone());
            }
            report.tool_calls.push(ToolCallRecord {
                call_id: call.id.clone(),
                tool: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
                output: output.clone(),
                failed: outcome.is_failure(),
            });
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            });
        }

        Ok(outputs)
    }

    async fn latest_reply(&self, thread_id: &str, run_id: &str) -> Result<String, RunError> {
        let messages = self.api.list_messages(thread_id).await?;
        messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.text())
            .ok_or_else(|| RunError::NoAssistantReply {
                run_id: run_id.to_string(),
            })
    }
}

/// Spread polls by up to 10% so concurrent sessions do not poll in lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.0..=0.1);
    delay.mul_f64(1.0 + factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistants::testing::{requires_action, run, ScriptedAssistants};
    use crate::tools::{Tool, ToolArgs, ToolName, ToolOutcome};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoWikipedia;

    #[async_trait]
    impl Tool for EchoWikipedia {
        fn name(&self) -> ToolName {
            ToolName::SearchWikipedia
        }

        fn description(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        }

        async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
            ToolOutcome::Success(format!("summary of {}", args.get_str("query").unwrap_or("")))
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            multiplier: 2.0,
            run_timeout: Duration::from_secs(5),
        }
    }

    fn driver(api: Arc<ScriptedAssistants>, poll: PollConfig) -> RunDriver {
        let tools = Arc::new(ToolRegistry::with_tools(vec![Arc::new(EchoWikipedia) as Arc<dyn Tool>]));
        RunDriver::new(api, tools, poll)
    }

    #[tokio::test]
    async fn tool_calls_are_answered_in_order_as_one_batch() {
        let api = Arc::new(ScriptedAssistants::new(
            vec![
                run("r", RunStatus::InProgress),
                requires_action(
                    "r",
                    &[
                        ("call_a", "search_wikipedia", r#"{"query":"XZ backdoor"}"#),
                        ("call_b", "search_bing", "{}"),
                        ("call_c", "search_wikipedia", r#"{"query":"liblzma"}"#),
                    ],
                ),
                run("r", RunStatus::InProgress),
                run("r", RunStatus::Completed),
            ],
            Some("Final answer"),
        ));

        let report = driver(api.clone(), fast_poll())
            .drive("thread_test", "run_1")
            .await
            .expect("run completes");

        let submissions = api.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0],
            vec![
                ToolOutput {
                    tool_call_id: "call_a".to_string(),
                    output: "summary of XZ backdoor".to_string()
                },
                ToolOutput {
                    tool_call_id: "call_b".to_string(),
                    output: "No handler for search_bing".to_string()
                },
                ToolOutput {
                    tool_call_id: "call_c".to_string(),
                    output: "summary of liblzma".to_string()
                },
            ]
        );
        assert_eq!(report.answer, "Final answer");
        assert_eq!(report.tool_calls.len(), 3);
        assert!(report.saved_files.is_empty());
    }

    #[tokio::test]
    async fn answer_is_the_newest_assistant_message() {
        let api = Arc::new(ScriptedAssistants::new(
            vec![run("r", RunStatus::Completed)],
            Some("Newest answer"),
        ));
        for (role, text) in [
            (MessageRole::User, "What is xz?"),
            (MessageRole::Assistant, "Oldest answer"),
            (MessageRole::User, "And liblzma?"),
            (MessageRole::Assistant, "Middle answer"),
            (MessageRole::User, "Who found the backdoor?"),
        ] {
            api.create_message("thread_test", role, text).await.unwrap();
        }

        let report = driver(api, fast_poll())
            .drive("thread_test", "run_1")
            .await
            .expect("run completes");
        assert_eq!(report.answer, "Newest answer");
    }

    #[tokio::test]
    async fn failed_run_is_a_typed_error() {
        let mut failed = run("r", RunStatus::Failed);
        failed.last_error = Some(crate::assistants::LastError {
            code: Some("server_error".to_string()),
            message: Some("boom".to_string()),
        });
        let api = Arc::new(ScriptedAssistants::new(vec![failed], None));

        let err = driver(api, fast_poll())
            .drive("thread_test", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Failed { ref reason, .. } if reason == "server_error: boom"));
    }

    #[tokio::test]
    async fn cancelled_and_expired_runs_stop_the_loop() {
        for status in [RunStatus::Cancelled, RunStatus::Expired, RunStatus::Incomplete] {
            let api = Arc::new(ScriptedAssistants::new(vec![run("r", status)], None));
            let err = driver(api.clone(), fast_poll())
                .drive("thread_test", "run_1")
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::Ended { status: s, .. } if s == status));
            assert_eq!(api.retrievals(), 1);
        }
    }

    #[tokio::test]
    async fn stuck_run_times_out_instead_of_spinning() {
        let api = Arc::new(ScriptedAssistants::new(
            vec![run("r", RunStatus::InProgress)],
            None,
        ));
        let poll = PollConfig {
            run_timeout: Duration::from_millis(30),
            ..fast_poll()
        };

        let err = driver(api.clone(), poll)
            .drive("thread_test", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
        assert!(api.retrievals() > 1);
        assert!(api.submissions().is_empty());
    }

    #[tokio::test]
    async fn requires_action_without_calls_is_rejected() {
        let api = Arc::new(ScriptedAssistants::new(
            vec![requires_action("r", &[])],
            None,
        ));
        let err = driver(api, fast_poll())
            .drive("thread_test", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::MissingToolCalls { .. }));
    }

    #[tokio::test]
    async fn completed_run_without_reply_is_an_error() {
        let api = Arc::new(ScriptedAssistants::new(
            vec![run("r", RunStatus::Completed)],
            None,
        ));
        let err = driver(api, fast_poll())
            .drive("thread_test", "run_1")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoAssistantReply { .. }));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = with_jitter(base);
            assert!(d >= base && d <= Duration::from_millis(1100));
        }
    }
}
