//! HTTP API for research sessions.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/sessions` - Open a session (registers the agent, creates a thread)
//! - `GET /api/sessions/:id/messages` - Session transcript
//! - `POST /api/sessions/:id/messages` - Run a research turn
//! - `POST /api/sessions/:id/preset` - Run the canned XZ backdoor request
//! - `GET /api/sessions/:id/download` - Download the saved research file

mod routes;
pub mod types;

pub use routes::{router, serve, ApiConnector, AppState};
