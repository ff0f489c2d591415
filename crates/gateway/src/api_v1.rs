//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                  — Run one message through the pipeline
//! - `GET    /v1/sessions/{id}/history` — Recent turns of a session
//! - `DELETE /v1/sessions/{id}`         — Forget a session's short-term state
//! - `GET    /v1/tools`                 — List the tool catalog
//! - `POST   /v1/tools/refresh`         — Re-discover tools from the endpoint
//! - `POST   /v1/documents`             — Ingest a reference document
//! - `GET    /v1/documents`             — List ingested documents
//! - `POST   /v1/documents/search`      — Similarity search over documents
//! - `GET    /v1/documents/{id}`        — Fetch one document
//! - `DELETE /v1/documents/{id}`        — Remove a document

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use vireo_agent::{ChatInput, ChatOutput, Orchestrator};
use vireo_core::error::{Error, MemoryError, ToolError};
use vireo_core::tool::ToolDescriptor;
use vireo_memory::{Document, DocumentHit, DocumentStore};

// ── State ─────────────────────────────────────────────────────────────────

/// Turns returned by the history endpoint when no limit is given.
const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Hits returned by document search when no `top_k` is given.
const DEFAULT_DOCUMENT_TOP_K: usize = 3;

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub orchestrator: Arc<Orchestrator>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiV1State {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            start_time: chrono::Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        (chrono::Utc::now() - self.start_time).num_seconds().max(0) as u64
    }
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/sessions/{id}/history", get(history_handler))
        .route("/sessions/{id}", delete(clear_session_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/refresh", post(refresh_tools_handler))
        .route("/documents", post(add_document_handler).get(list_documents_handler))
        .route("/documents/search", post(search_documents_handler))
        .route(
            "/documents/{id}",
            get(get_document_handler).delete(delete_document_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Reply text the client can show when the pipeline could not answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnDto {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub timestamp_ms: i64,
    pub created_at: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<TurnDto>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

impl From<&[ToolDescriptor]> for ToolListResponse {
    fn from(descriptors: &[ToolDescriptor]) -> Self {
        Self {
            tools: descriptors
                .iter()
                .map(|d| ToolDto {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    parameters: d.input_schema.clone(),
                })
                .collect(),
            count: descriptors.len(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentRequest {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SearchDocumentsRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentSearchResponse {
    pub hits: Vec<DocumentHit>,
    pub count: usize,
}

// ── Error mapping ─────────────────────────────────────────────────────────

fn pipeline_error(e: Error) -> ApiError {
    let (status, reply) = match &e {
        Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, None),
        Error::ServiceUnavailable { reply, .. } => (StatusCode::SERVICE_UNAVAILABLE, Some(reply.clone())),
        Error::RequestTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, None),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %e, "Chat request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            reply,
        }),
    )
}

fn catalog_error(e: ToolError) -> ApiError {
    warn!(error = %e, "Tool catalog unavailable");
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: e.to_string(),
            reply: None,
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            reply: None,
        }),
    )
}

fn document_store(state: &ApiV1State) -> Result<&Arc<DocumentStore>, ApiError> {
    state.orchestrator.documents().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Document store not configured (set provider.embedding_model)".into(),
                reply: None,
            }),
        )
    })
}

fn document_error(e: MemoryError) -> ApiError {
    let status = match &e {
        MemoryError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MemoryError::EmbeddingFailed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = status.as_u16(), error = %e, "Document store call failed");
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            reply: None,
        }),
    )
}

fn document_not_found(id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Document not found: {id}"),
            reply: None,
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatInput>,
) -> Result<Json<ChatOutput>, ApiError> {
    info!(
        session_id = payload.session_id.as_deref().unwrap_or("-"),
        message_len = payload.message.len(),
        "v1/chat request"
    );
    state
        .orchestrator
        .execute(payload)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

async fn history_handler(
    State(state): State<SharedApiState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let turns: Vec<TurnDto> = state
        .orchestrator
        .history(&session_id, limit)
        .await
        .into_iter()
        .map(|m| TurnDto {
            role: m.role.map(|r| r.as_str().to_string()).unwrap_or_default(),
            timestamp_ms: m.created_at.timestamp_millis(),
            created_at: m.created_at.to_rfc3339(),
            id: m.id,
            session_id: m.session_id,
            content: m.content,
            metadata: m.metadata,
        })
        .collect();

    Json(HistoryResponse {
        count: turns.len(),
        session_id,
        turns,
    })
}

async fn clear_session_handler(
    State(state): State<SharedApiState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    state.orchestrator.clear_session(&session_id).await;
    StatusCode::NO_CONTENT
}

async fn list_tools_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let tools = state.orchestrator.catalog().tools().await.map_err(catalog_error)?;
    Ok(Json(ToolListResponse::from(tools.as_slice())))
}

async fn refresh_tools_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let tools = state.orchestrator.catalog().refresh().await.map_err(catalog_error)?;
    info!(count = tools.len(), "Tool catalog refreshed");
    Ok(Json(ToolListResponse::from(tools.as_slice())))
}

async fn add_document_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<AddDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let store = document_store(&state)?;
    if payload.content.trim().is_empty() {
        return Err(bad_request("Document content must not be empty"));
    }
    let document = store
        .add(payload.content, payload.metadata)
        .await
        .map_err(document_error)?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn list_documents_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let documents = document_store(&state)?.list().await;
    Ok(Json(DocumentListResponse {
        count: documents.len(),
        documents,
    }))
}

async fn search_documents_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<SearchDocumentsRequest>,
) -> Result<Json<DocumentSearchResponse>, ApiError> {
    let store = document_store(&state)?;
    if payload.query.trim().is_empty() {
        return Err(bad_request("Query must not be empty"));
    }
    let top_k = payload.top_k.unwrap_or(DEFAULT_DOCUMENT_TOP_K);
    let hits = store
        .search(&payload.query, top_k)
        .await
        .map_err(document_error)?;
    Ok(Json(DocumentSearchResponse {
        count: hits.len(),
        hits,
    }))
}

async fn get_document_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ApiError> {
    document_store(&state)?
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| document_not_found(&id))
}

async fn delete_document_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = document_store(&state)?
        .delete(&id)
        .await
        .map_err(document_error)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(document_not_found(&id))
    }
}
