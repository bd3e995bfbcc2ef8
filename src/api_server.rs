//! HTTP API for dev-runner
//!
//! Exposes the supervisor over JSON routes under `/api`, plus an SSE stream
//! of `state` and `log` events. Every error body has the shape
//! `{"error": "<message>"}`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;
use tower_http::services::ServeDir;

use crate::detect::{app_metadata, detect, join_command};
use crate::ports::{allocate, DEFAULT_MAX_ATTEMPTS};
use crate::process::{Supervisor, SupervisorError};
use crate::types::{AppInput, PortCategory};

const SSE_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_FREE_PORT_START: u16 = 3000;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub supervisor: Supervisor,
}

/// Error returned by handlers, rendered as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<SupervisorError> for ApiError {
    fn from(err: SupervisorError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("API error ({}): {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// A port given either as a JSON number or as a numeric string
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    pub fn to_port(&self) -> Option<u16> {
        let value = match self {
            PortValue::Number(n) => *n,
            PortValue::Text(s) => s.trim().parse::<u64>().ok()?,
        };
        u16::try_from(value).ok().filter(|p| *p != 0)
    }
}

fn require_port(value: Option<&PortValue>) -> ApiResult<u16> {
    value
        .and_then(PortValue::to_port)
        .ok_or_else(|| ApiError::bad_request("port must be an integer between 1 and 65535"))
}

fn parse_path_port(raw: &str) -> ApiResult<u16> {
    require_port(Some(&PortValue::Text(raw.to_string())))
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e.body_text())))
}

/// Run a supervisor call on the blocking pool; it persists with fsync and may
/// fork a child
async fn run_blocking<T, F>(call: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SupervisorError> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError::internal(format!("Supervisor task failed: {}", e)))?
        .map_err(ApiError::from)
}

#[derive(Deserialize, Debug)]
pub struct AssignRequest {
    #[serde(rename = "appId")]
    pub app_id: Option<String>,
    pub port: Option<PortValue>,
}

#[derive(Deserialize, Debug)]
pub struct UnassignRequest {
    pub port: Option<PortValue>,
}

#[derive(Deserialize, Debug)]
pub struct AddPortRequest {
    pub port: Option<PortValue>,
    pub category: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct DetectRequest {
    pub cwd: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct FreePortQuery {
    pub from: Option<u16>,
}

#[derive(Serialize, Debug, Default, PartialEq)]
pub struct DetectResponse {
    pub detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// First launch command, shell-quoted, with `{PORT}` tokens kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "dev-runner"
    }))
}

async fn state_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.supervisor.state())
}

async fn list_apps_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.supervisor.apps())
}

async fn create_app_handler(
    State(state): State<ApiState>,
    payload: Result<Json<AppInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = parse_body(payload)?;
    let supervisor = state.supervisor.clone();
    let app = run_blocking(move || supervisor.create_app(input)).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

async fn update_app_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<AppInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = parse_body(payload)?;
    let supervisor = state.supervisor.clone();
    let app = run_blocking(move || supervisor.update_app(&id, input)).await?;
    Ok(Json(app))
}

async fn delete_app_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let supervisor = state.supervisor.clone();
    run_blocking(move || supervisor.delete_app(&id)).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn add_port_handler(
    State(state): State<ApiState>,
    payload: Result<Json<AddPortRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = parse_body(payload)?;
    let port = require_port(req.port.as_ref())?;
    let category: PortCategory = req
        .category
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("category is required"))?
        .parse()
        .map_err(|e: String| ApiError::bad_request(e))?;

    let supervisor = state.supervisor.clone();
    run_blocking(move || supervisor.add_port(port, category)).await?;
    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

async fn remove_port_handler(
    State(state): State<ApiState>,
    Path(raw_port): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let port = parse_path_port(&raw_port)?;
    let supervisor = state.supervisor.clone();
    run_blocking(move || supervisor.remove_port(port)).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn free_port_handler(
    query: Result<Query<FreePortQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query
        .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e.body_text())))?;
    let from = query.from.filter(|p| *p != 0).unwrap_or(DEFAULT_FREE_PORT_START);
    let port = tokio::task::spawn_blocking(move || allocate(from, DEFAULT_MAX_ATTEMPTS))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to allocate port: {}", e)))?
        .ok_or_else(|| ApiError::internal("No free port available"))?;
    Ok(Json(json!({ "port": port })))
}

async fn assign_handler(
    State(state): State<ApiState>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = parse_body(payload)?;
    let app_id = req
        .app_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("appId is required"))?;
    let port = require_port(req.port.as_ref())?;

    let supervisor = state.supervisor.clone();
    let pid = run_blocking(move || supervisor.assign(&app_id, port)).await?;
    Ok(Json(json!({ "ok": true, "pid": pid })))
}

async fn unassign_handler(
    State(state): State<ApiState>,
    payload: Result<Json<UnassignRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = parse_body(payload)?;
    let port = require_port(req.port.as_ref())?;
    let supervisor = state.supervisor.clone();
    run_blocking(move || supervisor.unassign(port)).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn logs_handler(
    State(state): State<ApiState>,
    Path(raw_port): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let port = parse_path_port(&raw_port)?;
    Ok(Json(json!({ "logs": state.supervisor.logs_for(port) })))
}

async fn events_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.supervisor.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            let event = rx.recv().await?;
            match event.to_json() {
                Ok(data) => {
                    let sse = Event::default().event(event.name()).data(data);
                    return Some((Ok::<Event, Infallible>(sse), rx));
                }
                Err(e) => warn!("Dropping event: {}", e),
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(SSE_KEEPALIVE_INTERVAL))
}

async fn detect_handler(
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let req = parse_body(payload)?;
    let cwd = req
        .cwd
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("cwd is required"))?;

    let response = tokio::task::spawn_blocking(move || detect_response(&cwd))
        .await
        .map_err(|e| ApiError::internal(format!("Failed to run detection: {}", e)))?;
    Ok(Json(response))
}

/// Run detection and shape the result for the UI
pub fn detect_response(cwd: &str) -> DetectResponse {
    let detection = detect(std::path::Path::new(cwd));
    let Some(first) = detection.commands.first().filter(|_| detection.detected) else {
        return DetectResponse {
            detected: false,
            error: detection.reason,
            ..Default::default()
        };
    };

    let (app_type, icon) = app_metadata(&detection.stack);
    DetectResponse {
        detected: true,
        framework: Some(detection.stack.clone()),
        command: Some(join_command(first)),
        port: detection.default_port,
        app_type: Some(app_type.to_string()),
        icon: Some(icon.to_string()),
        name: Some(detection.stack.clone()),
        env: detection.env.clone(),
        error: None,
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the full application router
pub fn router(supervisor: Supervisor, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/state", get(state_handler))
        .route("/apps", get(list_apps_handler).post(create_app_handler))
        .route(
            "/apps/{id}",
            put(update_app_handler).delete(delete_app_handler),
        )
        .route("/ports", post(add_port_handler))
        .route("/ports/free", get(free_port_handler))
        .route("/ports/{port}", delete(remove_port_handler))
        .route("/assign", post(assign_handler))
        .route("/unassign", post(unassign_handler))
        .route("/logs/{port}", get(logs_handler))
        .route("/events", get(events_handler))
        .route("/detect", post(detect_handler));

    let app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(ApiState { supervisor });

    match static_dir {
        Some(dir) => {
            info!("Serving static files from {:?}", dir);
            app.fallback_service(ServeDir::new(dir))
        }
        None => app,
    }
}

// ============================================================================
// TESTS
// ============================================================================
