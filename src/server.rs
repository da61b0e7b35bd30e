//! Thin HTTP boundary over the chat and ingestion services.
//!
//! # Endpoints
//!
//! | Method | Path             | Description                                   |
//! |--------|------------------|-----------------------------------------------|
//! | `POST` | `/api/v1/chat`   | SSE chat turn: sources, tokens, `[DONE]`      |
//! | `POST` | `/api/v1/ingest` | Shared-secret ingestion trigger               |
//! | `GET`  | `/health`        | Health check (returns version)                |
//!
//! The chat stream carries, in order: one `sources` event, zero or more
//! `token` events, then the literal `[DONE]`. A fatal error before any token
//! is delivered as a single `error` event. All origins are permitted so the
//! docs site widget can call the API cross-origin.

use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, Sse},
    },
    routing::{get, post},
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{ChatEvent, ChatRequest, ChatService};
use crate::config::Settings;
use crate::ingestion::IngestionPipeline;
use crate::types::RagError;

/// Shared application state: lifecycle-managed resources built once at
/// startup and passed by reference to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub chat: Arc<ChatService>,
    pub pipeline: Arc<IngestionPipeline>,
}

/// Builds the router with all routes and the permissive CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/chat", post(handle_chat))
        .route("/api/v1/ingest", post(handle_ingest))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/v1/chat ============

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = Arc::clone(&state.chat).spawn_turn(request);
    let stream = receiver
        .into_stream()
        .map(|event| Ok(SseEvent::default().data(event_payload(&event))));
    Sse::new(stream)
}

/// Renders one chat event as the SSE `data:` payload the widget consumes.
fn event_payload(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Sources(sources) => json!({"type": "sources", "data": sources}).to_string(),
        ChatEvent::Token(fragment) => json!({"type": "token", "data": fragment}).to_string(),
        ChatEvent::Done => "[DONE]".to_string(),
        ChatEvent::Error(message) => json!({"type": "error", "data": message}).to_string(),
    }
}

// ============ POST /api/v1/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    corpus_dir: String,
}

#[derive(Serialize)]
struct IngestResponse {
    status: String,
    chunks_processed: usize,
    message: String,
}

async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided != state.settings.api_secret {
        return Err(AppError::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "invalid API key",
        ));
    }

    let report = state
        .pipeline
        .run(Path::new(&request.corpus_dir))
        .await
        .map_err(|err| match err {
            RagError::Corpus(message) => {
                AppError::new(StatusCode::NOT_FOUND, "corpus_not_found", message)
            }
            other => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ingestion_failed",
                other.to_string(),
            ),
        })?;

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        chunks_processed: report.chunks_indexed,
        message: format!(
            "ingestion completed: {} documents, {} chunks, {} degraded batches",
            report.documents, report.chunks_indexed, report.degraded_batches
        ),
    }))
}
