//! Agent definition registered with the hosted API.

use crate::assistants::AgentDefinition;
use crate::tools::ToolRegistry;

pub const ASSISTANT_NAME: &str = "Research Assistant";

pub const INSTRUCTIONS: &str = "You are a research assistant who uses tools to gather information, extract website content, and save it to a file.";

/// Build the agent definition with the registry's tool descriptors.
pub fn build_agent_definition(model: &str, tools: &ToolRegistry) -> AgentDefinition {
    AgentDefinition {
        name: ASSISTANT_NAME.to_string(),
        instructions: INSTRUCTIONS.to_string(),
        model: model.to_string(),
        tools: tools.descriptors(),
    }
}
