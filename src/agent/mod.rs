//! Agent module - driving hosted research runs.
//!
//! A research turn follows the hosted "run" lifecycle:
//! 1. Append the user's request to the session thread
//! 2. Start a run of the registered agent definition
//! 3. Poll the run; when it requires action, execute its tool calls and submit the outputs
//! 4. Once the run completes, read back the newest assistant message

mod prompt;
mod run_driver;
mod session;

pub use prompt::{build_agent_definition, ASSISTANT_NAME, INSTRUCTIONS};
pub use run_driver::{RunDriver, RunError, RunReport, ToolCallRecord};
pub use session::{ChatMessage, ResearchSession, SessionError, SessionStore, Turn, PRESET_PROMPT};
