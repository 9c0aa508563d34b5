//! HTTP surface for the browser front-end.
//!
//! Work requests (`/api/...`, `/apipost`) become work items on the bridge and
//! the worker's reply is returned as-is. Asset requests resolve to files under
//! the asset root and are streamed back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use waiveconf::WaiveConfig;
use waiveproto::{Bridge, BridgeError, Payload, ProtoError, ReplyBody, ResultItem, WorkItem};

use crate::assets::{content_type_for, AssetRef, AssetResolver, ResolveError, ResolvedPath};

/// Shared state for gateway handlers. Nothing in here changes after startup.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<WaiveConfig>,
    pub bridge: Bridge,
    pub resolver: AssetResolver,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(config: Arc<WaiveConfig>, bridge: Bridge) -> Self {
        let resolver = AssetResolver::from_config(&config);
        Self {
            config,
            bridge,
            resolver,
            start_time: Instant::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidWork(#[from] ProtoError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::InvalidWork(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) | GatewayError::Resolve(_) => StatusCode::NOT_FOUND,
            GatewayError::Bridge(BridgeError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Bridge(BridgeError::WorkerGone) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Bridge(BridgeError::Closed) | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(handle_health))
        .route("/api/{operation}/{id}", get(api_get))
        .route("/apipost", post(api_post))
        .route(
            "/sample/{group}/{category}/{folder}/{filename}",
            get(sample_asset),
        )
        .route("/drum/{category}/{folder}/{filename}", get(legacy_drum))
        .route("/sound/{category}/{folder}/{filename}", get(legacy_sound))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Served at `/` when no `index_file` is configured.
const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Waive</title>
</head>
<body>
  <h1>Waive</h1>
  <p>Sample server is running. Work requests go to <code>/api/&lt;operation&gt;/&lt;id&gt;</code>
  or <code>POST /apipost</code>; samples are served from <code>/sample/...</code>.</p>
</body>
</html>
"##;

#[tracing::instrument(name = "http.index", skip(state))]
async fn serve_index(State(state): State<GatewayState>) -> Html<String> {
    if let Some(path) = &state.config.paths.index_file {
        match tokio::fs::read_to_string(path).await {
            Ok(html) => return Html(html),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Index file unreadable, using built-in page");
            }
        }
    }
    Html(INDEX_HTML.to_string())
}

async fn handle_health(State(state): State<GatewayState>) -> Json<Value> {
    let worker_alive = state.bridge.worker_alive();

    Json(json!({
        "status": if worker_alive { "healthy" } else { "degraded" },
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "pending": state.bridge.pending(),
        "worker": if worker_alive { "running" } else { "gone" },
    }))
}

/// Query parameters become the payload. For a repeated key the first value
/// wins and keys keep their order.
fn payload_from_query(pairs: Vec<(String, String)>) -> Payload {
    let mut payload = Payload::new();
    for (key, value) in pairs {
        payload.entry(key).or_insert(Value::String(value));
    }
    payload
}

#[tracing::instrument(
    name = "http.api.get",
    skip(state, query),
    fields(work.operation = %operation, work.correlation_id = %id)
)]
async fn api_get(
    State(state): State<GatewayState>,
    Path((operation, id)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, GatewayError> {
    let item = WorkItem::new(operation, id, payload_from_query(query))?;
    dispatch(&state, item).await
}

/// `POST /apipost` body.
#[derive(Debug, Deserialize)]
struct ApiPost {
    #[serde(rename = "type")]
    operation: String,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    data: Option<Value>,
}

impl ApiPost {
    fn into_work_item(self) -> Result<WorkItem, GatewayError> {
        let id = match self.id {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        };

        let payload = match self.data {
            None | Some(Value::Null) => Payload::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(GatewayError::BadRequest(
                    "\"data\" must be a JSON object".to_string(),
                ))
            }
        };

        Ok(WorkItem::new(self.operation, id, payload)?)
    }
}

#[tracing::instrument(
    name = "http.api.post",
    skip(state, body),
    fields(work.operation = tracing::field::Empty, work.correlation_id = tracing::field::Empty)
)]
async fn api_post(State(state): State<GatewayState>, body: Bytes) -> Result<Response, GatewayError> {
    let request: ApiPost = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::BadRequest(format!("invalid request body: {}", e)))?;
    let item = request.into_work_item()?;

    let span = tracing::Span::current();
    span.record("work.operation", item.operation.as_str());
    span.record("work.correlation_id", item.correlation_id.as_str());

    dispatch(&state, item).await
}

async fn dispatch(state: &GatewayState, item: WorkItem) -> Result<Response, GatewayError> {
    let reply = state.bridge.request(item).await?;
    Ok(reply_response(reply))
}

/// Worker replies are returned verbatim with status 200, whatever they say.
fn reply_response(reply: ResultItem) -> Response {
    match reply.payload {
        ReplyBody::Json(value) => Json(value).into_response(),
        ReplyBody::Text(text) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        ReplyBody::Bytes(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
    }
}

#[tracing::instrument(
    name = "http.asset.sample",
    skip(state),
    fields(asset.group = %group, asset.category = %category)
)]
async fn sample_asset(
    State(state): State<GatewayState>,
    Path((group, category, folder, filename)): Path<(String, String, String, String)>,
) -> Result<Response, GatewayError> {
    let resolved = state
        .resolver
        .resolve(&AssetRef::new(group, category, folder, filename))?;
    serve_file(resolved).await
}

#[tracing::instrument(name = "http.asset.drum", skip(state))]
async fn legacy_drum(
    State(state): State<GatewayState>,
    Path((category, folder, filename)): Path<(String, String, String)>,
) -> Result<Response, GatewayError> {
    let resolved = state
        .resolver
        .resolve_legacy_drum(&category, &folder, &filename)?;
    serve_file(resolved).await
}

#[tracing::instrument(name = "http.asset.sound", skip(state))]
async fn legacy_sound(
    State(state): State<GatewayState>,
    Path((category, folder, filename)): Path<(String, String, String)>,
) -> Result<Response, GatewayError> {
    let resolved = state
        .resolver
        .resolve_legacy_sound(&category, &folder, &filename)?;
    serve_file(resolved).await
}

/// Stream a resolved asset inline, so browsers play it rather than save it.
async fn serve_file(resolved: ResolvedPath) -> Result<Response, GatewayError> {
    let path: PathBuf = resolved.full_path();

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GatewayError::NotFound(resolved.filename));
        }
        Err(e) => return Err(e.into()),
    };
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(GatewayError::NotFound(resolved.filename));
    }

    tracing::debug!(path = %path.display(), bytes = metadata.len(), "Streaming asset");

    let disposition = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        quote_filename(&resolved.filename)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(body)
        .map_err(|e| GatewayError::Io(std::io::Error::other(e)))
}

/// Backslash-escape a filename for a quoted-string header parameter.
fn quote_filename(filename: &str) -> String {
    filename.replace('\\', "\\\\").replace('"', "\\\"")
}
