//! Streamable-HTTP front end: `POST /mcp` routed to per-session MCP servers
//! by the `mcp-session-id` header.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono_tz::Tz;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::factory::ServiceFactory;
use crate::session::{SessionRegistry, SessionTransport};
use crate::tools::CalendarMcp;

pub const SESSION_HEADER: &str = "mcp-session-id";

const PARSE_ERROR: i64 = -32700;
const INTERNAL_ERROR: i64 = -32603;
const BAD_SESSION: i64 = -32000;

/// Shared router state.
#[derive(Clone)]
pub struct HttpState {
    pub sessions: SessionRegistry,
    factory: Arc<dyn ServiceFactory>,
    default_timezone: Tz,
}

impl HttpState {
    pub fn new(factory: Arc<dyn ServiceFactory>, default_timezone: Tz) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            factory,
            default_timezone,
        }
    }
}

/// Periodically close sessions that have been quiet for `max_idle`.
pub fn spawn_idle_sweeper(sessions: SessionRegistry, max_idle: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(max_idle.clamp(Duration::from_secs(1), Duration::from_secs(60)));
        loop {
            interval.tick().await;
            close_idle(&sessions, max_idle).await;
        }
    });
}

async fn close_idle(sessions: &SessionRegistry, max_idle: Duration) -> usize {
    let idle = sessions.remove_idle(max_idle);
    for transport in &idle {
        transport.close().await;
        info!(session_id = %transport.session_id(), "Closed idle session");
    }
    idle.len()
}

pub fn router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    Router::new()
        .route(
            "/mcp",
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
        .layer(cors)
}

fn rpc_error(status: StatusCode, code: i64, message: &str, id: Value) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id,
    });
    (status, Json(body)).into_response()
}

fn bad_session() -> Response {
    rpc_error(
        StatusCode::BAD_REQUEST,
        BAD_SESSION,
        "Bad Request: No valid session ID provided",
        Value::Null,
    )
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn is_initialize_request(message: &Value) -> bool {
    message.get("jsonrpc").and_then(Value::as_str) == Some("2.0")
        && message.get("method").and_then(Value::as_str) == Some("initialize")
        && message.get("id").is_some_and(|id| !id.is_null())
}

fn message_id(message: &Value) -> Value {
    message.get("id").cloned().unwrap_or(Value::Null)
}

/// POST /mcp - Forward JSON-RPC messages to the session's server
async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed JSON-RPC body");
            return rpc_error(StatusCode::BAD_REQUEST, PARSE_ERROR, "Parse error", Value::Null);
        }
    };

    match session_id(&headers) {
        Some(id) => match state.sessions.get(id) {
            Some(transport) => forward(&transport, message).await,
            None => bad_session(),
        },
        None if is_initialize_request(&message) => start_session(&state, message).await,
        None => bad_session(),
    }
}

/// GET /mcp - No server-initiated stream is offered
async fn handle_get() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// DELETE /mcp - Close the session
async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let Some(transport) = session_id(&headers).and_then(|id| state.sessions.remove(id)) else {
        return bad_session();
    };

    transport.close().await;
    info!(session_id = %transport.session_id(), "Session deleted by client");
    StatusCode::OK.into_response()
}

async fn start_session(state: &HttpState, request: Value) -> Response {
    let id = message_id(&request);

    let service = match state.factory.create().await {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Failed to initialize calendar service");
            let message = format!("Internal error: {}", e);
            return rpc_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, &message, id);
        }
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let server = CalendarMcp::new(Arc::new(service), state.default_timezone);
    let transport = SessionTransport::open(session_id.clone(), server, state.sessions.clone());

    let reply = match transport.send(&request).await {
        Ok(Some(reply)) => reply,
        Ok(None) => {
            transport.close().await;
            return bad_session();
        }
        Err(e) => {
            error!(error = %e, "MCP server failed during initialize");
            transport.close().await;
            let message = format!("Internal error: {}", e);
            return rpc_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, &message, id);
        }
    };

    if reply.get("result").is_none() {
        transport.close().await;
        return (StatusCode::OK, Json(reply)).into_response();
    }

    state.sessions.insert(transport);
    info!(session_id = %session_id, "Session initialized");

    (StatusCode::OK, [(SESSION_HEADER, session_id)], Json(reply)).into_response()
}

async fn forward(transport: &SessionTransport, message: Value) -> Response {
    match message {
        Value::Array(batch) => {
            let mut replies = Vec::new();
            for item in batch {
                match transport.send(&item).await {
                    Ok(Some(reply)) => replies.push(reply),
                    Ok(None) => {}
                    Err(e) => return transport_failure(transport, &item, e),
                }
            }
            if replies.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                (StatusCode::OK, Json(Value::Array(replies))).into_response()
            }
        }
        message => match transport.send(&message).await {
            Ok(Some(reply)) => (StatusCode::OK, Json(reply)).into_response(),
            Ok(None) => StatusCode::ACCEPTED.into_response(),
            Err(e) => transport_failure(transport, &message, e),
        },
    }
}

fn transport_failure(
    transport: &SessionTransport,
    message: &Value,
    e: crate::session::TransportError,
) -> Response {
    error!(session_id = %transport.session_id(), error = %e, "Session transport failed");
    let text = format!("Internal error: {}", e);
    rpc_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_ERROR,
        &text,
        message_id(message),
    )
}
