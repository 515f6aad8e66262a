//! REST API Server for the grounded answer orchestrator
//!
//! `POST /api/search` answers with a newline-delimited JSON frame stream.
//! Dropping the response body cancels the turn.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::models::{HistoryMessage, Role, TurnRequest};

// ===== Request Models =====

#[derive(Debug, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Chat-style message; text comes from `content` or from `text` parts.
#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
}

impl ChatMessage {
    fn text(&self) -> String {
        match &self.parts {
            Some(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
            None => self.content.clone().unwrap_or_default(),
        }
    }

    fn role(&self) -> Option<Role> {
        match self.role.as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl SearchRequest {
    /// Explicit `query` wins; otherwise the last message is the query and
    /// the earlier ones are the history.
    pub fn into_turn_request(self) -> crate::Result<TurnRequest> {
        let explicit = self
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);

        let (query, derived_history) = match explicit {
            Some(query) => (query, Vec::new()),
            None => match self.messages.split_last() {
                Some((last, earlier)) => {
                    let history = earlier
                        .iter()
                        .filter_map(|m| {
                            m.role().map(|role| HistoryMessage {
                                role,
                                text: m.text(),
                            })
                        })
                        .collect();
                    (last.text().trim().to_string(), history)
                }
                None => (String::new(), Vec::new()),
            },
        };

        if query.is_empty() {
            return Err(OrchestrationError::InvalidRequest(
                "Query is required".to_string(),
            ));
        }

        let history = if self.history.is_empty() {
            derived_history
        } else {
            self.history
        };

        Ok(TurnRequest::new(query).with_history(history))
    }
}

// ===== Response Wrapper =====

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ===== API State =====

/// Which provider keys the server was started with
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub has_firecrawl_key: bool,
    pub has_groq_key: bool,
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub keys: KeyStatus,
}

// ===== Health Endpoints =====

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn check_env(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.keys))
}

// ===== Search Endpoint =====

async fn search_handler(State(state): State<ApiState>, Json(req): Json<SearchRequest>) -> Response {
    let request = match req.into_turn_request() {
        Ok(r) => r,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
                .into_response()
        }
    };

    let cancel = CancellationToken::new();
    let (turn_id, rx) = state.orchestrator.spawn_turn(request, cancel.clone());
    info!(turn_id = %turn_id, "Streaming turn");

    // the guard travels with the body; dropping the body cancels the turn
    let guard = cancel.drop_guard();
    let frames = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        match frame.to_ndjson() {
            Ok(line) => Some((Ok::<_, Infallible>(line), (rx, guard))),
            Err(e) => {
                warn!(turn_id = %frame.turn, error = %e, "Failed to encode frame");
                None
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

// ===== Router =====

pub fn create_router(orchestrator: Arc<Orchestrator>, keys: KeyStatus) -> Router {
    let state = ApiState { orchestrator, keys };

    Router::new()
        .route("/health", get(health))
        .route("/api/check-env", get(check_env))
        .route("/api/search", post(search_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ===== Server Startup =====

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    keys: KeyStatus,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator, keys);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
