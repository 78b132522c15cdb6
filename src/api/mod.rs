//! Matchfeed HTTP Surface
//!
//! Axum router hosting the WebSocket upgrade endpoint and health checks.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws` - Real-time match feed (path is configurable)
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Connection and topic counters
//!
//! Upgrade attempts on any other path get an empty `404` with
//! `Connection: close`. The feed protocol asks for such sockets to be
//! dropped without any response, but `axum::serve` always writes one, so
//! the empty `404` is the closest this server gets.
//!
//! # Example
//!
//! ```rust,no_run
//! use matchfeed::api::{serve, AppState};
//! use matchfeed::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let state = AppState::new(&config);
//!
//!     // Hand this to the match/commentary writers
//!     let _notifier = state.notifier();
//!
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::websocket::{websocket_handler, HeartbeatMonitor};

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.websocket.path.clone();

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route(&ws_path, get(websocket_handler))
        .nest("/health", health_routes)
        .fallback(reject_unknown)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Fallback for unknown paths
///
/// Upgrade attempts are refused without a body and the connection is
/// closed.
async fn reject_unknown(headers: HeaderMap) -> Response {
    if headers.contains_key(header::UPGRADE) {
        tracing::debug!("Upgrade attempt on unknown path");
        return (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")]).into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Start the server and run until Ctrl+C or SIGTERM
pub async fn serve(state: AppState, config: &ServerConfig) -> ApiResult<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Matchfeed listening on {}", addr);

    serve_with_shutdown(listener, state, shutdown_signal()).await
}

/// Run the server on a bound listener until `shutdown` resolves
///
/// Starts the heartbeat monitor for the lifetime of the server. On
/// shutdown the hub is cancelled once, which closes every connection and
/// stops the monitor.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> ApiResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Arc::clone(&state.hub);
    let monitor = HeartbeatMonitor::start(Arc::clone(&hub), state.websocket.heartbeat_interval());
    let router = build_router(state);

    let hub_for_signal = Arc::clone(&hub);
    let result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        hub_for_signal.shutdown();
    })
    .await
    .map_err(|e| ApiError::Server(e.to_string()));

    // Also covers the server loop failing before the signal fired
    hub.shutdown();
    monitor.stop().await;

    result?;
    tracing::info!("Matchfeed shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = AppState::new(&Config::default());
        let hub = Arc::clone(&state.hub);
        let reg = hub.register().await.unwrap();
        hub.subscribe(&reg.id, 1).await.unwrap();

        let response = build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["connections"], 1);
        assert_eq!(value["topics"], 1);
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = build_router(AppState::new(&Config::default()))
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upgrade_on_unknown_path_is_refused_without_body() {
        let request = Request::get("/other")
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();

        let response = build_router(AppState::new(&Config::default()))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
