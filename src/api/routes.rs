//! HTTP routes for research sessions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::agent::{
    build_agent_definition, ChatMessage, ResearchSession, RunError, SessionError, SessionStore,
    PRESET_PROMPT,
};
use crate::assistants::{AssistantsApi, OpenAiAssistants};
use crate::config::Config;
use crate::tools::ToolRegistry;

use super::types::{
    CreateSessionRequest, CreateSessionResponse, HealthResponse, PostMessageRequest, TurnResponse,
};

/// Opens a hosted API client for an API key.
pub type ApiConnector = Arc<dyn Fn(&str) -> Arc<dyn AssistantsApi> + Send + Sync>;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tools: Arc<ToolRegistry>,
    pub sessions: SessionStore,
    connect: ApiConnector,
}

impl AppState {
    pub fn new(config: Config, connect: ApiConnector) -> Self {
        let tools = Arc::new(ToolRegistry::new(&config));
        Self {
            config,
            tools,
            sessions: SessionStore::new(),
            connect,
        }
    }

    /// State backed by the OpenAI assistants API.
    pub fn with_openai(config: Config) -> Self {
        let base_url = config.openai_base_url.clone();
        let connect: ApiConnector = Arc::new(move |api_key: &str| {
            Arc::new(OpenAiAssistants::new(api_key, base_url.clone())) as Arc<dyn AssistantsApi>
        });
        Self::new(config, connect)
    }
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id/messages",
            get(get_messages).post(post_message),
        )
        .route("/api/sessions/:id/preset", post(post_preset))
        .route("/api/sessions/:id/download", get(download))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::with_openai(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Open a session: register the agent definition and create a thread.
///
/// The body is optional when `OPENAI_API_KEY` is configured. Nothing else is
/// possible without an API key, so a missing key refuses the whole session.
async fn create_session(
    State(state): State<Arc<AppState>>,
    req: Option<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, String)> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let api_key = req
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| state.config.api_key.clone())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Please enter your OpenAI API Key".to_string(),
        ))?;

    let api = (state.connect)(api_key.trim());
    let definition = build_agent_definition(&state.config.model, &state.tools);
    let session = ResearchSession::start(
        api,
        state.tools.clone(),
        &definition,
        state.config.poll.clone(),
    )
    .await
    .map_err(session_error)?;
    let session = state.sessions.insert(session).await;

    Ok(Json(CreateSessionResponse {
        id: session.id(),
        assistant_id: session.assistant_id().to_string(),
        thread_id: session.thread_id().to_string(),
    }))
}

async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    let session = find_session(&state, id).await?;
    Ok(Json(session.transcript().await))
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    run_turn(&state, id, &req.content).await
}

/// Submit the canned XZ backdoor request.
async fn post_preset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    run_turn(&state, id, PRESET_PROMPT).await
}

async fn run_turn(
    state: &AppState,
    id: Uuid,
    content: &str,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let session = find_session(state, id).await?;
    tracing::info!(
        session_id = %id,
        content_len = content.len(),
        "Received research request"
    );

    let turn = session.ask(content).await.map_err(session_error)?;
    Ok(Json(TurnResponse::from_turn(id, turn)))
}

/// Serve the research file saved by this session.
async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = find_session(&state, id).await?;
    let file = session.saved_file().await.ok_or((
        StatusCode::NOT_FOUND,
        "No research file has been saved yet".to_string(),
    ))?;

    let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
        tracing::warn!(path = %file.path.display(), error = %e, "Failed to read research file");
        (
            StatusCode::NOT_FOUND,
            format!("Research file unavailable: {}", e),
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, file.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        bytes,
    ))
}

async fn find_session(
    state: &AppState,
    id: Uuid,
) -> Result<Arc<ResearchSession>, (StatusCode, String)> {
    state
        .sessions
        .get(id)
        .await
        .ok_or((StatusCode::NOT_FOUND, format!("Session {} not found", id)))
}

fn session_error(err: SessionError) -> (StatusCode, String) {
    let status = match &err {
        SessionError::RunStillActive { .. } => StatusCode::CONFLICT,
        SessionError::EmptyMessage => StatusCode::BAD_REQUEST,
        SessionError::Run(RunError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        SessionError::Api(_) | SessionError::Run(_) => StatusCode::BAD_GATEWAY,
    };
    if status == StatusCode::CONFLICT || status == StatusCode::BAD_REQUEST {
        tracing::warn!("{}", err);
    } else {
        tracing::error!("{}", err);
    }
    (status, err.to_string())
}
