//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<AppState>`.
//! Tool calls return 200 for both success and recoverable error
//! payloads; the payload's `success` flag tells them apart.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::agent::{Agent, AgentEvent, Conversation};
use crate::query::QueryEngine;
use crate::tools::{self, ToolInfo};
use crate::types::{DataError, DateRange, DatasetName};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Sessions kept before the least recently used one is dropped.
pub const MAX_SESSIONS: usize = 1000;

/// One chat session. The mutex serializes questions on the same session.
pub struct Session {
    pub conversation: Arc<Mutex<Conversation>>,
    pub last_used: Instant,
}

/// Shared state accessible by all route handlers.
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub agent: Agent,
    pub model_name: String,
    pub sessions: RwLock<HashMap<String, Session>>,
    max_sessions: usize,
}

impl AppState {
    pub fn new(engine: Arc<QueryEngine>, agent: Agent, model_name: impl Into<String>) -> Self {
        Self {
            engine,
            agent,
            model_name: model_name.into(),
            sessions: RwLock::new(HashMap::new()),
            max_sessions: MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// The session's conversation, created if new. Evicts the least
    /// recently used session when the map is full.
    async fn session(&self, id: &str) -> Arc<Mutex<Conversation>> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.last_used = Instant::now();
            return Arc::clone(&session.conversation);
        }

        if sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(session = %oldest, "Evicting least recently used session");
                sessions.remove(&oldest);
            }
        }

        let conversation = Arc::new(Mutex::new(Conversation::new()));
        sessions.insert(
            id.to_string(),
            Session {
                conversation: Arc::clone(&conversation),
                last_used: Instant::now(),
            },
        );
        conversation
    }
}

pub type SharedState = Arc<AppState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub session_id: String,
    pub answer: String,
    pub events: Vec<AgentEvent>,
    pub tool_calls: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub name: &'static str,
    pub folder: &'static str,
    pub observations: usize,
    pub historical_range: Option<DateRange>,
    pub forecast_horizon: usize,
    pub forecast_window: Option<DateRange>,
    pub drivers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub sessions: usize,
}

/// A JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": error, "message": message.into() }),
        }
    }

    fn internal(error: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.model_name.clone(),
        sessions: state.sessions.read().await.len(),
    })
}

/// GET /api/tools
pub async fn list_tools() -> Json<Vec<ToolInfo>> {
    Json(tools::list_tools())
}

/// POST /api/tools/:name
pub async fn call_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    if tools::find_tool(&name).is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_tool",
            format!("Tool '{name}' does not exist"),
        ));
    }

    let engine = Arc::clone(&state.engine);
    let tool = name.clone();
    let result = tokio::task::spawn_blocking(move || tools::call(&engine, &tool, args))
        .await
        .map_err(|e| ApiError::internal("internal_error", e.to_string()))?;

    match result {
        Ok(payload) => Ok(Json(payload)),
        Err(e) => {
            let message = format!("{:#}", anyhow::Error::new(e));
            error!(tool = %name, error = %message, "Tool failed on corrupt data");
            Err(ApiError::internal("data_error", message))
        }
    }
}

/// POST /api/ask
pub async fn ask(
    State(state): State<SharedState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "empty_question", "Question must not be empty"));
    }

    let session_id = request
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Only the per-session lock is held across the model calls.
    let session = state.session(&session_id).await;
    let mut conversation = session.lock().await;
    let result = state.agent.ask(&mut conversation, question).await;
    drop(conversation);

    match result {
        Ok(reply) => {
            info!(session = %session_id, tool_calls = reply.tool_calls, rounds = reply.rounds, "Question answered");
            Ok(Json(AskResponse {
                session_id,
                answer: reply.answer,
                events: reply.events,
                tool_calls: reply.tool_calls,
            }))
        }
        Err(e) => {
            error!(session = %session_id, error = %e, "Agent failed");
            Err(ApiError::internal("agent_error", format!("{e:#}")))
        }
    }
}

/// GET /api/datasets
pub async fn list_datasets(State(state): State<SharedState>) -> Result<Json<Vec<DatasetInfo>>, ApiError> {
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || dataset_overview(&engine))
        .await
        .map_err(|e| ApiError::internal("internal_error", e.to_string()))?;

    result
        .map(Json)
        .map_err(|e| ApiError::internal("data_error", e.to_string()))
}

/// Per-dataset file coverage. Missing files count as zero.
pub fn dataset_overview(engine: &QueryEngine) -> Result<Vec<DatasetInfo>, DataError> {
    let loader = engine.loader();
    DatasetName::ALL
        .iter()
        .map(|ds| {
            let historical = loader.load_historical(ds.as_str())?;
            let forecast = loader.load_forecast(ds.as_str())?;
            let drivers = loader.load_drivers_parsed(ds.as_str())?;

            Ok(DatasetInfo {
                name: ds.as_str(),
                folder: ds.folder(),
                observations: historical.as_ref().map_or(0, |h| h.len()),
                historical_range: historical.and_then(|h| h.range()),
                forecast_horizon: forecast.as_ref().map_or(0, |f| f.horizon()),
                forecast_window: forecast.map(|f| f.window()),
                drivers: drivers.map_or(0, |d| d.len()),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
