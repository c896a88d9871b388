//! Web access tools: search and page scraping.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use serde_json::{json, Value};

use super::{Tool, ToolArgs, ToolName, ToolOutcome};

/// Sentinel returned when a search produces nothing.
pub const NO_RESULTS: &str = "No results found.";

/// Page fetch timeout.
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum characters of page text handed back to the agent.
pub const SCRAPE_MAX_CHARS: usize = 1000;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ResearchAssistant/1.0)";

/// Elements whose text is never shown to a reader.
const HIDDEN_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Search the web via DuckDuckGo's HTML endpoint.
pub struct SearchDuckDuckGo {
    client: reqwest::Client,
    search_url: String,
}

impl SearchDuckDuckGo {
    pub fn new(search_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, search_url }
    }

    /// Address of the top result, or [`NO_RESULTS`].
    pub async fn top_result(&self, query: &str) -> anyhow::Result<String> {
        let html = self
            .client
            .post(&self.search_url)
            .form(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(first_result_url(&html).unwrap_or_else(|| NO_RESULTS.to_string()))
    }
}

/// First organic result link in a DuckDuckGo HTML results page.
///
/// Result links usually go through a `/l/?uddg=<target>` redirect; the target
/// is unwrapped when present.
pub fn first_result_url(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.result__a").ok()?;

    let first = document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .map(unwrap_redirect)
        .find(|href| !href.is_empty());
    first
}

fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    match url::Url::parse(&absolute) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

#[async_trait]
impl Tool for SearchDuckDuckGo {
    fn name(&self) -> ToolName {
        ToolName::SearchDuckduckgo
    }

    fn description(&self) -> &str {
        "Search DuckDuckGo and return the top result URL."
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
            Err(e) => return ToolOutcome::failure("Search error", e),
        };

        tracing::info!(%query, "Searching DuckDuckGo");
        match self.top_result(query).await {
            Ok(url) => ToolOutcome::Success(url),
            Err(e) => ToolOutcome::failure("Search error", e),
        }
    }
}

/// Fetch a page and return its visible text.
pub struct ScrapeWebsite {
    client: reqwest::Client,
}

impl Default for ScrapeWebsite {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeWebsite {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub async fn scrape(&self, url: &str) -> anyhow::Result<String> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "only http/https URLs are supported, got {}",
                parsed.scheme()
            ));
        }

        let body = self.client.get(parsed).send().await?.text().await?;
        Ok(truncate_chars(&extract_visible_text(&body), SCRAPE_MAX_CHARS))
    }
}

/// Visible text of an HTML document, one text node per line.
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let lines = document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .map(|el| HIDDEN_ELEMENTS.contains(&el.name()))
                        .unwrap_or(false)
                });
                let trimmed = text.trim();
                (!hidden && !trimmed.is_empty()).then_some(trimmed)
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    lines.join("\n")
}

/// Truncate to at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[async_trait]
impl Tool for ScrapeWebsite {
    fn name(&self) -> ToolName {
        ToolName::ScrapeWebsite
    }

    fn description(&self) -> &str {
        "Extract text content from a given webpage URL."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL of the page to extract"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        let url = match args.require_str("url") {
            Ok(url) => url,
            Err(e) => return scrape_failure(e),
        };

        tracing::info!(%url, "Scraping website");
        match self.scrape(url).await {
            Ok(text) => ToolOutcome::Success(text),
            Err(e) => scrape_failure(e),
        }
    }
}

/// Error text carries the request URL, so it is bounded like page text.
fn scrape_failure(reason: impl std::fmt::Display) -> ToolOutcome {
    let text = format!("Scraping error: {}", reason);
    ToolOutcome::Failure(truncate_chars(&text, SCRAPE_MAX_CHARS))
}
