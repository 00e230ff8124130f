//! WebSocket relay server
//!
//! Serves the relay endpoint at `/gpt/api/{token}/{model}`, a health check,
//! and the admin API. Each socket gets a reader loop that dispatches inbound
//! frames to its session and a writer task that drains the outbound channel.

use axum::{
    Json, Router,
    body::Body,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::trace::TraceLayer;

use crate::admin::handlers;
use crate::config::{ServerConfig, SettingsHandle};
use crate::error::{RelayError, Result};
use crate::relay::{Framing, ModelHint, SessionManager, WsConnection};
use crate::services::QuotaLedger;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Opens a session per authenticated socket
    pub sessions: Arc<SessionManager>,
    /// Runtime control flags and prices
    pub settings: SettingsHandle,
    /// Quota ledger, for the admin API
    pub ledger: Arc<dyn QuotaLedger>,
    /// Outbound wire framing
    pub framing: Framing,
    /// Bearer token for `/admin`; admin API disabled when `None`
    pub admin_token: Option<String>,
}

/// The relay server
pub struct RelayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Bind the listener and serve until a shutdown signal arrives
    pub async fn serve(&self) -> Result<()> {
        let app = create_router(Arc::clone(&self.state));

        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        tracing::info!("Relay endpoint: ws://{addr}/gpt/api/{{token}}/{{model}}");
        if self.state.admin_token.is_some() {
            tracing::info!("Admin API enabled under /admin");
        } else {
            tracing::info!("Admin API disabled (no admin.token configured)");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Server(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::Server(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/gpt/api/{token}/{model}", get(relay_handler))
        .route(
            "/admin/control",
            get(handlers::get_control_handler).put(handlers::put_control_handler),
        )
        .route("/admin/quota/{user_id}", get(handlers::get_quota_handler))
        .route(
            "/admin/quota/{user_id}/credit",
            post(handlers::credit_quota_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Upgrade to a relay WebSocket
async fn relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((token, model)): Path<(String, String)>,
) -> Response {
    let hint: ModelHint = model.parse().unwrap_or_default();
    ws.on_upgrade(move |socket| run_connection(socket, state, token, hint))
}

/// Drive one client socket until it closes
async fn run_connection(socket: WebSocket, state: Arc<AppState>, token: String, hint: ModelHint) {
    let (sink, mut inbound) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, rx));

    let connection = Arc::new(WsConnection::new(tx, state.framing));
    let Some(session) = state.sessions.open(&token, hint, connection.clone()).await else {
        // Dropping the only sender ends the writer, which drops the socket
        drop(connection);
        let _ = writer.await;
        return;
    };

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Outcomes are logged by the cycle itself
                let _ = session.handle_message(text.as_str().to_owned());
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                session.on_error(&e);
                break;
            }
        }
    }

    connection.mark_disconnected();
    session.close().await;
    tracing::debug!(session_id = %session.id(), "Socket reader finished");
}

async fn write_loop(mut sink: SplitSink<WebSocket, Message>, rx: mpsc::UnboundedReceiver<Message>) {
    let mut outbound = UnboundedReceiverStream::new(rx);
    while let Some(message) = outbound.next().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            tracing::debug!("Socket write failed: {e}");
            break;
        }
        if closing {
            break;
        }
    }
}

/// Create a JSON error response
pub(crate) fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        axum::http::HeaderValue::from_static("application/json"),
    );
    response
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
