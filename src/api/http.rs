// src/api/http.rs
// Thin axum collaborator wrapping `CoreApi` (design doc §6). Maps the RPC
// table onto REST plus one SSE stream for `kb.sync`; nothing under
// `src/agents`, `src/context`, `src/kb`, `src/telemetry`, or
// `src/conversation` depends on anything in this file.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::CoreError;
use crate::kb::types::SyncMode;
use crate::metrics;
use crate::telemetry::types::Vendor;

use super::CoreApi;

/// Builds the full router: RPC surface plus `/metrics` and an unauthenticated
/// `/health` (load balancers and container probes need it to work before a
/// key is configured).
pub fn router(api: Arc<CoreApi>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/ask", post(ask))
        .route("/conversations", get(list_conversations))
        .route("/conversations/{session_id}", get(get_conversation))
        .route("/kb/sync", post(kb_sync))
        .route("/kb/search", get(kb_search))
        .route("/kb/stats", get(kb_stats))
        .route("/telemetry/{vendor}/latest", get(telemetry_latest))
        .route("/telemetry/{vendor}/history", get(telemetry_history))
        .route("/agents/health", get(agents_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(api)
}

/// Maps `CoreError` onto an HTTP response the way design doc §7's
/// propagation policy describes: user-safe errors get their message back,
/// everything else is logged and collapsed to a generic 500.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if self.0.is_user_safe() {
            self.0.to_string()
        } else {
            warn!("internal error serving request: {}", self.0);
            "internal error".to_string()
        };
        (status, Json(serde_json::json!({ "error": message, "kind": self.0.kind() }))).into_response()
    }
}

fn check_api_key(api: &CoreApi, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = api.api_key.as_deref() else {
        return Ok(());
    };
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ApiError(CoreError::InvalidInput("missing or invalid API key".to_string())))
    }
}

async fn health(State(api): State<Arc<CoreApi>>) -> Json<crate::observability::SystemHealth> {
    Json(api.health().await)
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    message: String,
    session_id: Option<String>,
    user_id: Option<String>,
}

async fn ask(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Json(req): Json<AskRequest>,
) -> Result<Json<crate::agents::AskResult>, ApiError> {
    check_api_key(&api, &headers)?;
    let result = api.ask(&req.message, req.session_id.as_deref(), req.user_id.as_deref()).await;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct ListConversationsQuery {
    limit: Option<i64>,
}

async fn list_conversations(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Query(q): Query<ListConversationsQuery>,
) -> Result<Json<Vec<crate::conversation::SessionSummary>>, ApiError> {
    check_api_key(&api, &headers)?;
    let rows = api.list_conversations(q.limit.unwrap_or(50)).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct GetConversationQuery {
    limit: Option<i64>,
}

async fn get_conversation(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Query(q): Query<GetConversationQuery>,
) -> Result<Json<super::ConversationDetail>, ApiError> {
    check_api_key(&api, &headers)?;
    match api.get_conversation(&session_id, q.limit.unwrap_or(20)).await? {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError(CoreError::NotFound(format!("no conversation for session {session_id}")))),
    }
}

#[derive(Debug, Deserialize)]
struct KbSyncRequest {
    #[serde(default)]
    mode: KbSyncMode,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum KbSyncMode {
    #[default]
    Smart,
    Full,
}

/// Streams `SyncEvent`s as SSE until the runner reports `Done` or the
/// consumer disconnects (design doc §4.2, §5); the channel itself is the
/// collaborator boundary, same as the teacher's async-stream event feeds.
async fn kb_sync(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Json(req): Json<KbSyncRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_api_key(&api, &headers)?;
    let mode = match req.mode {
        KbSyncMode::Smart => SyncMode::Smart,
        KbSyncMode::Full => SyncMode::Full,
    };
    let rx = api.kb_sync(mode, req.force);
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

#[derive(Debug, Deserialize)]
struct KbSearchQuery {
    q: String,
    top_k: Option<usize>,
    threshold: Option<f32>,
}

async fn kb_search(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Query(q): Query<KbSearchQuery>,
) -> Result<Json<Vec<super::KbSearchResult>>, ApiError> {
    check_api_key(&api, &headers)?;
    let results = api.kb_search(&q.q, q.top_k.unwrap_or(5), q.threshold.unwrap_or(0.3)).await;
    Ok(Json(results))
}

async fn kb_stats(State(api): State<Arc<CoreApi>>, headers: HeaderMap) -> Result<Json<crate::kb::types::KbStats>, ApiError> {
    check_api_key(&api, &headers)?;
    let stats = api.kb_stats().await?;
    Ok(Json(stats))
}

fn parse_vendor(raw: &str) -> Result<Vendor, ApiError> {
    match raw {
        "solark" => Ok(Vendor::SolArk),
        "victron" => Ok(Vendor::Victron),
        other => Err(ApiError(CoreError::InvalidInput(format!("unknown vendor '{other}'")))),
    }
}

async fn telemetry_latest(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Path(vendor): Path<String>,
) -> Result<Json<Option<crate::telemetry::types::TelemetrySample>>, ApiError> {
    check_api_key(&api, &headers)?;
    let vendor = parse_vendor(&vendor)?;
    let sample = api.telemetry_latest(vendor).await?;
    Ok(Json(sample))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    hours: Option<i64>,
    limit: Option<i64>,
}

async fn telemetry_history(
    State(api): State<Arc<CoreApi>>,
    headers: HeaderMap,
    Path(vendor): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<crate::telemetry::types::TelemetrySample>>, ApiError> {
    check_api_key(&api, &headers)?;
    let vendor = parse_vendor(&vendor)?;
    let samples = api.telemetry_history(vendor, q.hours.unwrap_or(24), q.limit.unwrap_or(500)).await?;
    Ok(Json(samples))
}

async fn agents_health(State(api): State<Arc<CoreApi>>, headers: HeaderMap) -> Result<Json<super::AgentsHealthResponse>, ApiError> {
    check_api_key(&api, &headers)?;
    Ok(Json(api.agents_health().await))
}
