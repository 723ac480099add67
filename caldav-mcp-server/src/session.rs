//! HTTP sessions: one MCP server per session, reached over an in-process
//! duplex stream carrying newline-delimited JSON-RPC.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rmcp::ServiceExt;
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf, duplex, split,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::tools::CalendarMcp;

const DUPLEX_BUFFER: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session transport is closed")]
    Closed,

    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON-RPC message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Live sessions keyed by session id.
///
/// Clients that vanish without `DELETE /mcp` leave their entry behind;
/// `remove_idle` drops those once they've been quiet long enough.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, transport: Arc<SessionTransport>) {
        self.sessions
            .insert(transport.session_id().to_string(), transport);
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.remove(session_id).map(|(_, transport)| transport)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions with no traffic for `max_idle` and return them so the
    /// caller can close them. Sessions with a request in flight are kept.
    pub fn remove_idle(&self, max_idle: Duration) -> Vec<Arc<SessionTransport>> {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for().is_some_and(|d| d >= max_idle))
            .map(|entry| entry.key().clone())
            .collect();

        idle.iter().filter_map(|id| self.remove(id)).collect()
    }
}

struct TransportIo {
    /// `None` once the transport has been closed
    writer: Option<WriteHalf<DuplexStream>>,
    reader: BufReader<ReadHalf<DuplexStream>>,
    last_active: Instant,
}

/// Client end of one session's MCP server.
///
/// Requests are serialized: one message is written and its reply read
/// before the next caller gets the stream.
pub struct SessionTransport {
    session_id: String,
    io: Mutex<TransportIo>,
}

impl SessionTransport {
    /// Start `server` on a fresh duplex stream.
    ///
    /// When the server stops (client closed the stream, or it failed), the
    /// session is removed from `registry` under this transport's id.
    pub fn open(session_id: String, server: CalendarMcp, registry: SessionRegistry) -> Arc<Self> {
        let (client_side, server_side) = duplex(DUPLEX_BUFFER);
        let (server_read, server_write) = split(server_side);
        let (client_read, client_write) = split(client_side);

        let task_session_id = session_id.clone();
        tokio::spawn(async move {
            match server.serve((server_read, server_write)).await {
                Ok(running) => {
                    if let Err(e) = running.waiting().await {
                        warn!(session_id = %task_session_id, error = %e, "MCP session task failed");
                    }
                }
                Err(e) => {
                    debug!(session_id = %task_session_id, error = %e, "MCP session ended before initialization");
                }
            }
            registry.remove(&task_session_id);
            info!(session_id = %task_session_id, "Session closed");
        });

        Arc::new(SessionTransport {
            session_id,
            io: Mutex::new(TransportIo {
                writer: Some(client_write),
                reader: BufReader::new(client_read),
                last_active: Instant::now(),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send one JSON-RPC message.
    ///
    /// For a request, waits for the response with the same id and returns
    /// it. Notifications and responses get `None`.
    pub async fn send(&self, message: &Value) -> Result<Option<Value>, TransportError> {
        let mut io = self.io.lock().await;
        io.last_active = Instant::now();

        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let writer = io.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let Some(id) = request_id(message) else {
            return Ok(None);
        };

        loop {
            let mut buf = String::new();
            if io.reader.read_line(&mut buf).await? == 0 {
                return Err(TransportError::Closed);
            }

            let reply: Value = match serde_json::from_str(buf.trim()) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "Dropping unreadable server message");
                    continue;
                }
            };

            if is_response_to(&reply, id) {
                return Ok(Some(reply));
            }

            let method = reply.get("method").and_then(|m| m.as_str()).unwrap_or("-");
            debug!(session_id = %self.session_id, method, "Dropping server-initiated message");
        }
    }

    /// Time since the last message, or `None` while a request is in flight.
    pub fn idle_for(&self) -> Option<Duration> {
        self.io.try_lock().ok().map(|io| io.last_active.elapsed())
    }

    /// Shut down the client end; the server sees end of stream and exits.
    pub async fn close(&self) {
        let mut io = self.io.lock().await;
        if let Some(mut writer) = io.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(session_id = %self.session_id, error = %e, "Error closing session stream");
            }
        }
    }
}

/// Id of a JSON-RPC request (has both `method` and `id`).
fn request_id(message: &Value) -> Option<&Value> {
    message.get("method")?;
    message.get("id").filter(|id| !id.is_null())
}

fn is_response_to(reply: &Value, id: &Value) -> bool {
    reply.get("id") == Some(id) && (reply.get("result").is_some() || reply.get("error").is_some())
}
