//! Encyclopedia lookup against the MediaWiki action API.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolArgs, ToolName, ToolOutcome};

/// Sentences kept from the article extract.
const SUMMARY_SENTENCES: u32 = 5;

/// Summarise the best-matching Wikipedia article.
pub struct SearchWikipedia {
    client: reqwest::Client,
    api_url: String,
}

impl SearchWikipedia {
    pub fn new(api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("research-assistant/0.1 (https://github.com/research-assistant)")
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_url }
    }

    /// Title of the best match for `query`, then its plain-text extract.
    pub async fn summary(&self, query: &str) -> anyhow::Result<String> {
        if query.trim().is_empty() {
            return Err(anyhow::anyhow!("empty query"));
        }

        let search: Value = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("srprop", ""),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let title = best_match_title(&search, query)?;

        let sentences = SUMMARY_SENTENCES.to_string();
        let extract: Value = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("prop", "extracts|pageprops"),
                ("explaintext", "1"),
                ("exsentences", sentences.as_str()),
                ("redirects", "1"),
                ("titles", title.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        page_summary(&extract, &title)
    }
}

/// Pick the first search hit.
fn best_match_title(response: &Value, query: &str) -> anyhow::Result<String> {
    if let Some(info) = response.get("error").and_then(|e| e.get("info")) {
        return Err(anyhow::anyhow!("{}", info.as_str().unwrap_or("API error")));
    }
    response
        .pointer("/query/search/0/title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Page id \"{}\" does not match any pages. Try another id!",
                query
            )
        })
}

/// Extract text from a `prop=extracts|pageprops` response.
fn page_summary(response: &Value, title: &str) -> anyhow::Result<String> {
    let page = response
        .pointer("/query/pages")
        .and_then(Value::as_object)
        .and_then(|pages| pages.values().next())
        .ok_or_else(|| anyhow::anyhow!("no page returned for \"{}\"", title))?;

    if page.get("missing").is_some() {
        return Err(anyhow::anyhow!("page \"{}\" does not exist", title));
    }

    if page.pointer("/pageprops/disambiguation").is_some() {
        return Err(anyhow::anyhow!(
            "\"{}\" may refer to several topics; try a more specific query",
            title
        ));
    }

    let extract = page
        .get("extract")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if extract.is_empty() {
        return Err(anyhow::anyhow!("no summary available for \"{}\"", title));
    }

    Ok(extract.to_string())
}

#[async_trait]
impl Tool for SearchWikipedia {
    fn name(&self) -> ToolName {
        ToolName::SearchWikipedia
    }

    fn description(&self) -> &str {
        "Search for a topic on Wikipedia and return a summary."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The topic to search"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        let query = match args.require_str("query") {
            Ok(query) => query,
            Err(e) => return ToolOutcome::failure("Wikipedia error", e),
        };

        tracing::info!(%query, "Searching Wikipedia");
        match self.summary(query).await {
            Ok(summary) => ToolOutcome::Success(summary),
            Err(e) => {
                tracing::debug!(%query, error = %e, "Wikipedia lookup failed");
                ToolOutcome::failure("Wikipedia error", e)
            }
        }
    }
}
