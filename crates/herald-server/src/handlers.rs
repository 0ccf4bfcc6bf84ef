//! HTTP handlers for the Herald server.
//!
//! The ingress is the host side of the broadcaster: it accepts broadcast
//! requests and answers subscription auth requests (always with 403).

use crate::bootstrap;
use crate::config::Config;
use crate::metrics::{self, BroadcastTimer};
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use herald_protocol::{validate_exchange_name, validate_routing_key, BroadcastRequest};
use serde_json::json;
use std::sync::Arc;
use tenvis_herald_core::{AuthDecision, AuthRequest, BroadcastError, Broadcaster};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The broadcaster.
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/broadcast", post(broadcast_handler))
        .route("/broadcasting/auth", post(auth_handler))
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the broker is unreachable or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let broadcaster = Arc::new(bootstrap::connect(&config).await?);
    let state = Arc::new(AppState::new(broadcaster.clone()));
    let app = router(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Herald server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = broadcaster.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

/// Health check handler.
///
/// Reports 503 once the broker channel is closed: a closed channel never
/// recovers, so every later broadcast would fail.
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let open = state.broadcaster.is_open().await;
    let status = if open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if open { "ok" } else { "unavailable" },
            "broker": {
                "transport": state.broadcaster.transport(),
                "open": open
            },
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

fn error_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

/// Broadcast handler.
async fn broadcast_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BroadcastRequest>,
) -> Response {
    for channel in &request.channels {
        if let Err(reason) = validate_exchange_name(channel) {
            metrics::record_error("invalid_channel");
            return error_response(
                StatusCode::BAD_REQUEST,
                json!({"error": reason, "channel": channel}),
            );
        }
    }
    if let Err(reason) = validate_routing_key(&request.event) {
        metrics::record_error("invalid_event");
        return error_response(StatusCode::BAD_REQUEST, json!({"error": reason}));
    }

    debug!(
        event = %request.event,
        channels = request.channels.len(),
        "Broadcast request"
    );

    let _timer = BroadcastTimer::start();
    let result = state
        .broadcaster
        .broadcast(&request.channels, &request.event, &request.payload)
        .await;

    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({"published": request.channels.len()})),
        )
            .into_response(),
        Err(e) => {
            let (status, kind) = match &e {
                BroadcastError::Serialization { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "serialization")
                }
                BroadcastError::Transport { .. } => (StatusCode::BAD_GATEWAY, "transport"),
            };
            error!(event = %request.event, error = %e, "Broadcast failed");
            metrics::record_error(kind);

            error_response(
                status,
                json!({"error": e.to_string(), "published": e.published()}),
            )
        }
    }
}

/// Subscription auth handler.
///
/// The body is parsed best-effort: every request is denied regardless.
async fn auth_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: AuthRequest = serde_json::from_slice(&body).unwrap_or_default();

    let granted = match state.broadcaster.authorize(&request) {
        AuthDecision::Granted(result) => state
            .broadcaster
            .is_valid_auth_response(&request, &result)
            .then_some(result),
        AuthDecision::Denied => None,
    };

    match granted {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => {
            debug!(channel = %request.channel_name, "Subscription auth denied");
            metrics::record_auth_denied();
            error_response(StatusCode::FORBIDDEN, json!({"error": "Access denied"}))
        }
    }
}
