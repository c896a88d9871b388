//! Configuration management for the research assistant.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Optional. Default key for new sessions. Sessions may supply their own.
//! - `OPENAI_BASE_URL` - Optional. Hosted agent API base. Defaults to `https://api.openai.com/v1`.
//! - `ASSISTANT_MODEL` - Optional. Model for the agent definition. Defaults to `gpt-4o-mini-2024-07-18`.
//! - `WORKSPACE_PATH` - Optional. Directory holding the saved research file. Defaults to current directory.
//! - `RESEARCH_FILE` - Optional. Name of the saved research file. Defaults to `research.txt`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `POLL_INTERVAL_MS` - Optional. First run poll delay. Defaults to `1000`.
//! - `POLL_MAX_INTERVAL_MS` - Optional. Poll delay cap. Defaults to `8000`.
//! - `RUN_TIMEOUT_SECS` - Optional. Maximum time to wait on one run. Defaults to `300`.
//! - `WIKIPEDIA_API_URL` - Optional. MediaWiki action API endpoint.
//! - `DUCKDUCKGO_URL` - Optional. DuckDuckGo HTML search endpoint.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";
pub const DEFAULT_DUCKDUCKGO_URL: &str = "https://html.duckduckgo.com/html/";
pub const DEFAULT_RESEARCH_FILE: &str = "research.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Run polling configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first re-poll, and after every tool submission
    pub interval: Duration,

    /// Upper bound for a single delay
    pub max_interval: Duration,

    /// Multiplier applied after each idle poll
    pub multiplier: f64,

    /// Total time a run may take before the driver gives up
    pub run_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(8000),
            multiplier: 2.0,
            run_timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    /// Delay to use after `delay` produced another idle poll.
    pub fn next_interval(&self, delay: Duration) -> Duration {
        let next = delay.as_secs_f64() * self.multiplier;
        Duration::from_secs_f64(next.min(self.max_interval.as_secs_f64()))
    }
}

/// Endpoints used by the research tools.
#[derive(Debug, Clone)]
pub struct ToolEndpoints {
    pub wikipedia_api_url: String,
    pub duckduckgo_url: String,
}

impl Default for ToolEndpoints {
    fn default() -> Self {
        Self {
            wikipedia_api_url: DEFAULT_WIKIPEDIA_API_URL.to_string(),
            duckduckgo_url: DEFAULT_DUCKDUCKGO_URL.to_string(),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fallback OpenAI API key for sessions that do not bring one
    pub api_key: Option<String>,

    /// Hosted agent API base URL
    pub openai_base_url: String,

    /// Model identifier registered on the agent definition
    pub model: String,

    /// Directory the research file is written into
    pub workspace_path: PathBuf,

    /// File name of the saved research artifact
    pub research_file: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Run polling behaviour
    pub poll: PollConfig,

    /// Tool endpoints
    pub endpoints: ToolEndpoints,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse,
    /// `RESEARCH_FILE` is not a bare file name, or the poll interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());

        let model = std::env::var("ASSISTANT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let workspace_path = std::env::var("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let research_file =
            std::env::var("RESEARCH_FILE").unwrap_or_else(|_| DEFAULT_RESEARCH_FILE.to_string());
        if research_file.contains('/') || research_file.contains('\\') {
            return Err(ConfigError::InvalidValue(
                "RESEARCH_FILE".to_string(),
                "must be a bare file name".to_string(),
            ));
        }

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", 3000u16)?;

        let defaults = PollConfig::default();
        let poll = PollConfig {
            interval: Duration::from_millis(env_parse(
                "POLL_INTERVAL_MS",
                defaults.interval.as_millis() as u64,
            )?),
            max_interval: Duration::from_millis(env_parse(
                "POLL_MAX_INTERVAL_MS",
                defaults.max_interval.as_millis() as u64,
            )?),
            multiplier: defaults.multiplier,
            run_timeout: Duration::from_secs(env_parse(
                "RUN_TIMEOUT_SECS",
                defaults.run_timeout.as_secs(),
            )?),
        };
        if poll.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "POLL_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let endpoints = ToolEndpoints {
            wikipedia_api_url: std::env::var("WIKIPEDIA_API_URL")
                .unwrap_or_else(|_| DEFAULT_WIKIPEDIA_API_URL.to_string()),
            duckduckgo_url: std::env::var("DUCKDUCKGO_URL")
                .unwrap_or_else(|_| DEFAULT_DUCKDUCKGO_URL.to_string()),
        };

        Ok(Self {
            api_key,
            openai_base_url,
            model,
            workspace_path,
            research_file,
            host,
            port,
            poll,
            endpoints,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: Option<String>, workspace_path: PathBuf) -> Self {
        Self {
            api_key,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            workspace_path,
            research_file: DEFAULT_RESEARCH_FILE.to_string(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            poll: PollConfig::default(),
            endpoints: ToolEndpoints::default(),
        }
    }

    /// Full path of the saved research file.
    pub fn research_file_path(&self) -> PathBuf {
        self.workspace_path.join(&self.research_file)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}
