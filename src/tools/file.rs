//! Research file persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{SavedFile, Tool, ToolArgs, ToolName, ToolOutcome, SAVED_FILE_MIME};

/// Write `text` to `path`, replacing any previous contents.
///
/// Returns the file name. There is one research file; every save overwrites it.
pub async fn save_to_file(path: &Path, text: &str) -> anyhow::Result<String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, text).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))?;
    Ok(file_name)
}

/// Save the research text to the fixed research file.
pub struct SaveToFile {
    path: PathBuf,
}

impl SaveToFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Tool for SaveToFile {
    fn name(&self) -> ToolName {
        ToolName::SaveToFile
    }

    fn description(&self) -> &str {
        "Save the provided text to a file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The research text to save"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        let text = match args.require_str("text") {
            Ok(text) => text,
            Err(e) => return ToolOutcome::failure("File error", e),
        };

        match save_to_file(&self.path, text).await {
            Ok(file_name) => {
                tracing::info!(path = %self.path.display(), bytes = text.len(), "Saved research file");
                ToolOutcome::Saved(SavedFile {
                    file_name,
                    path: self.path.clone(),
                    mime_type: SAVED_FILE_MIME,
                })
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to save research file");
                ToolOutcome::failure("File error", e)
            }
        }
    }
}
