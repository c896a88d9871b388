//! Research tools and the dispatch table that runs them.
//!
//! Tool calls arrive from the hosted agent as a name plus a JSON-encoded argument
//! string chosen by the model. The [`ToolRegistry`] is the only way in: it maps
//! the name onto one of four fixed tools, validates the payload against the
//! tool's declared parameter schema, and hands the tool only the keys that
//! schema declares.
//!
//! Tools are total. Whatever goes wrong inside one is reported as a
//! [`ToolOutcome::Failure`] and submitted to the agent as ordinary output text.

mod file;
mod web;
mod wikipedia;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::assistants::ToolDescriptor;
use crate::config::Config;

pub use file::{save_to_file, SaveToFile};
pub use web::{extract_visible_text, first_result_url, ScrapeWebsite, SearchDuckDuckGo};
pub use wikipedia::SearchWikipedia;

/// MIME type the saved research file is served with.
pub const SAVED_FILE_MIME: &str = "text/plain";

/// Output text submitted for a successful save.
pub const FILE_SAVED_OUTPUT: &str = "File saved successfully.";

/// The fixed set of tools the agent may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchWikipedia,
    SearchDuckduckgo,
    ScrapeWebsite,
    SaveToFile,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::SearchWikipedia,
        ToolName::SearchDuckduckgo,
        ToolName::ScrapeWebsite,
        ToolName::SaveToFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchWikipedia => "search_wikipedia",
            Self::SearchDuckduckgo => "search_duckduckgo",
            Self::ScrapeWebsite => "scrape_website",
            Self::SaveToFile => "save_to_file",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or(())
    }
}

/// The research file written by `save_to_file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub mime_type: &'static str,
}

/// Result of running a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
    Saved(SavedFile),
}

impl ToolOutcome {
    /// Failure text in the `"<label>: <reason>"` shape the agent is shown.
    pub fn failure(label: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failure(format!("{}: {}", label, reason))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn saved_file(&self) -> Option<&SavedFile> {
        match self {
            Self::Saved(file) => Some(file),
            _ => None,
        }
    }

    /// Plain-text form submitted back to the run.
    pub fn to_output(&self) -> String {
        match self {
            Self::Success(text) | Self::Failure(text) => text.clone(),
            Self::Saved(_) => FILE_SAVED_OUTPUT.to_string(),
        }
    }
}

/// Arguments that passed schema validation. Holds declared keys only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        self.get_str(key)
            .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A tool the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &str;

    /// JSON schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome;
}

/// Dispatch table from tool name to tool.
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry with the four production tools.
    pub fn new(config: &Config) -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(SearchWikipedia::new(config.endpoints.wikipedia_api_url.clone())),
            Arc::new(SearchDuckDuckGo::new(config.endpoints.duckduckgo_url.clone())),
            Arc::new(ScrapeWebsite::new()),
            Arc::new(SaveToFile::new(config.research_file_path())),
        ];
        Self::with_tools(tools)
    }

    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let tools = tools.into_iter().map(|t| (t.name(), t)).collect();
        Self { tools }
    }

    /// Descriptors for the agent definition, in a stable order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        ToolName::ALL
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                ToolDescriptor::function(
                    tool.name().as_str(),
                    tool.description(),
                    tool.parameters_schema(),
                )
            })
            .collect()
    }

    /// Run the named tool on a raw, model-supplied argument string.
    ///
    /// Never fails: unknown names and invalid payloads become output text.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> ToolOutcome {
        let tool = match name.parse::<ToolName>().ok().and_then(|n| self.tools.get(&n)) {
            Some(tool) => tool,
            None => {
                tracing::warn!(tool = %name, "No handler for tool call");
                return ToolOutcome::Success(format!("No handler for {}", name));
            }
        };

        let args = match validate_arguments(&tool.parameters_schema(), raw_arguments) {
            Ok(args) => args,
            Err(reason) => {
                tracing::warn!(tool = %name, %reason, "Rejected tool arguments");
                return ToolOutcome::failure(&format!("Invalid arguments for {}", name), reason);
            }
        };

        tool.execute(&args).await
    }
}

/// Check `raw` against `schema` and keep only the keys the schema declares.
///
/// Malformed JSON or a non-object payload counts as an empty object, so a
/// tool with required parameters rejects it and one without accepts it.
fn validate_arguments(schema: &Value, raw: &str) -> Result<ToolArgs, String> {
    let payload = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).collect::<Vec<_>>())
        .unwrap_or_default();

    for key in &required {
        match payload.get(*key) {
            None | Some(Value::Null) => return Err(format!("missing required '{}'", key)),
            Some(_) => {}
        }
    }

    let mut allowed = Map::new();
    for (key, property) in &properties {
        let value = match payload.get(key) {
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };
        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                return Err(format!("'{}' must be of type {}", key, expected));
            }
        }
        allowed.insert(key.clone(), value.clone());
    }

    Ok(ToolArgs(allowed))
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}
