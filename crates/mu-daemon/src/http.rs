//! Axum HTTP/WS surface for the daemon.
//!
//! Replaces the teacher's newline-delimited JSON-RPC pipe (`ipc.rs`) with
//! the closed route list from spec.md §6, while keeping the teacher's
//! `Arc<Mutex<Engine>>`-plus-handler-per-method structure from `ipc.rs`'s
//! `dispatch`/`handle_*` functions almost one-for-one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use mu_core::context::ExtractionConfig;
use mu_core::error::MuError;
use mu_core::graph::TraversalDirection;
use mu_core::model::{EdgeType, Node};
use mu_core::store::SCHEMA_VERSION;
use mu_core::Engine;

use crate::events::GraphEvent;
use crate::metrics::PerformanceMetrics;

/// Per-handler timeout bucket. Cheap lookups get a short budget; query,
/// context, and export work (parsing, graph expansion, rendering) get more.
const FAST_TIMEOUT: Duration = Duration::from_secs(5);
const SLOW_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every axum handler.
pub struct AppState {
    pub engine: Arc<Mutex<Engine>>,
    pub events: broadcast::Sender<GraphEvent>,
    pub metrics: PerformanceMetrics,
    pub started_at: Instant,
    pub connections: AtomicUsize,
}

impl AppState {
    pub fn new(engine: Arc<Mutex<Engine>>, events: broadcast::Sender<GraphEvent>) -> Self {
        Self {
            engine,
            events,
            metrics: PerformanceMetrics::default(),
            started_at: Instant::now(),
            connections: AtomicUsize::new(0),
        }
    }
}

/// Build the router with all nine routes from spec.md §6.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/nodes/{id}", get(get_node_handler))
        .route("/nodes/{id}/neighbors", get(neighbors_handler))
        .route("/query", post(query_handler))
        .route("/context", post(context_handler))
        .route("/impact", post(impact_handler))
        .route("/ancestors", post(ancestors_handler))
        .route("/cycles", post(cycles_handler))
        .route("/export", get(export_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wraps [`MuError`] (and handler timeouts) with the status-code mapping
/// from spec.md §7: 4xx for user/config/not-found errors, 5xx for
/// upstream/internal ones.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.1 }));
        (self.0, body).into_response()
    }
}

impl From<MuError> for ApiError {
    fn from(e: MuError) -> Self {
        let status = match &e {
            MuError::Config { .. } | MuError::Syntax { .. } | MuError::Parse { .. } => StatusCode::BAD_REQUEST,
            MuError::NotFound { .. } => StatusCode::NOT_FOUND,
            MuError::AlreadyExists { .. } => StatusCode::CONFLICT,
            MuError::Locked { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MuError::Incompatible { .. } => StatusCode::CONFLICT,
            MuError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            MuError::GraphNotLoaded
            | MuError::Upstream { .. }
            | MuError::Database(_)
            | MuError::Io(_)
            | MuError::Serialization(_)
            | MuError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

async fn with_timeout<T>(
    budget: Duration,
    fut: impl std::future::Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError(StatusCode::REQUEST_TIMEOUT, "request exceeded its time budget".into())),
    }
}

fn parse_edge_types(raw: Option<&str>) -> Option<Vec<EdgeType>> {
    let raw = raw?;
    let types: Vec<EdgeType> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(EdgeType::from_str_lossy)
        .collect();
    if types.is_empty() { None } else { Some(types) }
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    node_count: usize,
    edge_count: usize,
    schema_version: u32,
    connection_count: usize,
    vectors_indexed: usize,
    embedding_available: bool,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    with_timeout(FAST_TIMEOUT, async {
        let engine = state.engine.lock().await;
        let status = engine.status()?;
        Ok(Json(StatusResponse {
            uptime_secs: state.started_at.elapsed().as_secs(),
            node_count: status.node_count,
            edge_count: status.edge_count,
            schema_version: SCHEMA_VERSION,
            connection_count: state.connections.load(Ordering::Relaxed),
            vectors_indexed: status.vectors_indexed,
            embedding_available: status.embedding_available,
        }))
    })
    .await
}

// ---------------------------------------------------------------------------
// GET /nodes/{id}
// ---------------------------------------------------------------------------

async fn get_node_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Node>, ApiError> {
    with_timeout(FAST_TIMEOUT, async {
        let engine = state.engine.lock().await;
        let node = engine.store().get_node(&id)?;
        node.map(Json).ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("no such node: {id}")))
    })
    .await
}

// ---------------------------------------------------------------------------
// GET /nodes/{id}/neighbors?direction=&depth=&types=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NeighborsQuery {
    direction: Option<String>,
    depth: Option<usize>,
    types: Option<String>,
}

async fn neighbors_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(params): Query<NeighborsQuery>,
) -> Result<Json<Vec<Node>>, ApiError> {
    with_timeout(FAST_TIMEOUT, async {
        let direction = match params.direction.as_deref() {
            Some("in") => TraversalDirection::In,
            Some("both") => TraversalDirection::Both,
            _ => TraversalDirection::Out,
        };
        let depth = params.depth.unwrap_or(1);
        let edge_types = parse_edge_types(params.types.as_deref());

        let engine = state.engine.lock().await;
        let ids = engine.graph().neighbors(&id, direction, depth, edge_types.as_deref())?;
        let mut nodes = Vec::with_capacity(ids.len());
        for nid in ids {
            if let Some(node) = engine.store().get_node(&nid)? {
                nodes.push(node);
            }
        }
        Ok(Json(nodes))
    })
    .await
}

// ---------------------------------------------------------------------------
// POST /query
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QueryRequest {
    muql: String,
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let start = Instant::now();
        let engine = state.engine.lock().await;
        let result = engine.execute(&req.muql)?;
        state.metrics.record_search_latency(start.elapsed());
        Ok(Json(result).into_response())
    })
    .await
}

// ---------------------------------------------------------------------------
// POST /context
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContextRequest {
    question: String,
    #[serde(flatten)]
    config: ContextRequestConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ContextRequestConfig {
    max_tokens: Option<u32>,
}

async fn context_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContextRequest>,
) -> Result<Response, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let mut config = ExtractionConfig::default();
        if let Some(max_tokens) = req.config.max_tokens {
            config.max_tokens = max_tokens;
        }

        let engine = state.engine.lock().await;
        let result = engine.context(&req.question, &config).await?;
        Ok(Json(result).into_response())
    })
    .await
}

// ---------------------------------------------------------------------------
// POST /impact, POST /ancestors
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NodeEdgeTypesRequest {
    node: String,
    edge_types: Option<Vec<String>>,
}

fn resolve_edge_types(raw: &Option<Vec<String>>) -> Option<Vec<EdgeType>> {
    let raw = raw.as_ref()?;
    let types: Vec<EdgeType> = raw.iter().filter_map(|s| EdgeType::from_str_lossy(s)).collect();
    if types.is_empty() { None } else { Some(types) }
}

async fn impact_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NodeEdgeTypesRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let edge_types = resolve_edge_types(&req.edge_types);
        let engine = state.engine.lock().await;
        let ids = engine.graph().impact(&req.node, edge_types.as_deref())?;
        Ok(Json(ids))
    })
    .await
}

async fn ancestors_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NodeEdgeTypesRequest>,
) -> Result<Json<Vec<String>>, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let edge_types = resolve_edge_types(&req.edge_types);
        let engine = state.engine.lock().await;
        let ids = engine.graph().ancestors(&req.node, edge_types.as_deref())?;
        Ok(Json(ids))
    })
    .await
}

// ---------------------------------------------------------------------------
// POST /cycles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct CyclesRequest {
    edge_types: Option<Vec<String>>,
}

async fn cycles_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CyclesRequest>>,
) -> Result<Json<Vec<Vec<String>>>, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let req = body.map(|Json(r)| r).unwrap_or_default();
        let edge_types = resolve_edge_types(&req.edge_types);
        let engine = state.engine.lock().await;
        let cycles = engine.graph().find_cycles(edge_types.as_deref())?;
        Ok(Json(cycles))
    })
    .await
}

// ---------------------------------------------------------------------------
// GET /export?format=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ExportQuery {
    #[serde(default = "default_export_format")]
    format: String,
}

fn default_export_format() -> String {
    "mutext".into()
}

async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    with_timeout(SLOW_TIMEOUT, async {
        let engine = state.engine.lock().await;
        match params.format.as_str() {
            "mutext" => {
                let nodes = engine.store().all_nodes()?;
                let config = mu_core::context::ExportConfig::default();
                let text = mu_core::context::render::render(&nodes, engine.store(), &config)?;
                Ok(([(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
            }
            "json" => {
                let nodes = engine.store().all_nodes()?;
                let edges = engine.store().all_edges()?;
                Ok(Json(serde_json::json!({ "nodes": nodes, "edges": edges })).into_response())
            }
            other => Err(ApiError(StatusCode::BAD_REQUEST, format!("unsupported export format: {other}"))),
        }
    })
    .await
}

// ---------------------------------------------------------------------------
// WS /ws
// ---------------------------------------------------------------------------

async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    state.connections.fetch_add(1, Ordering::Relaxed);
    let mut rx = state.events.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        // Slow consumer: drop the connection rather than block the worker.
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.connections.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edge_types_filters_unknown() {
        let parsed = parse_edge_types(Some("contains,bogus,imports"));
        assert_eq!(parsed, Some(vec![EdgeType::Contains, EdgeType::Imports]));
    }

    #[test]
    fn test_parse_edge_types_none_when_empty() {
        assert_eq!(parse_edge_types(Some("")), None);
        assert_eq!(parse_edge_types(None), None);
    }

    #[test]
    fn test_api_error_maps_not_found() {
        let err: ApiError = MuError::NotFound { entity: "x".into() }.into();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_api_error_maps_internal() {
        let err: ApiError = MuError::Internal("boom".into()).into();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
