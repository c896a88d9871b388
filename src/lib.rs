//! # Research Assistant
//!
//! A chat-driven research assistant backed by a hosted agent run.
//!
//! This library provides:
//! - An HTTP API for research sessions and file download
//! - A run driver that polls hosted runs and answers their tool calls
//! - Four research tools: Wikipedia, DuckDuckGo, page scraping and file saving
//!
//! ## Example
//!
//! ```rust,ignore
//! use research_assistant::{api, config::Config};
//!
//! let config = Config::from_env()?;
//! api::serve(config).await?;
//! ```

pub mod agent;
pub mod api;
pub mod assistants;
pub mod config;
pub mod tools;

pub use config::Config;
