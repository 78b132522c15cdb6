//! # Matchfeed
//!
//! Real-time fan-out server for live match updates.
//!
//! Clients hold one WebSocket connection, subscribe to matches by id and
//! receive commentary for those matches as it is written, plus a
//! `match_created` event for every new match.
//!
//! ## Features
//!
//! - **Admission control**: upgrade requests pass an external policy before
//!   the handshake; denials become plain HTTP 429/403/503 responses
//! - **Subscription index**: match id → subscribers, pruned as it empties
//! - **Heartbeats**: unresponsive peers are dropped within two periods
//! - **Best-effort fan-out**: one slow or dead client never holds up the rest
//!
//! ## Modules
//!
//! - [`websocket`]: Connection hub, gate, router, heartbeat and notifier
//! - [`api`]: Axum server, health routes and graceful shutdown
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use matchfeed::{serve, AppState, Config};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let state = AppState::new(&config);
//!     let notifier = state.notifier();
//!
//!     // Called by the match writer after a successful insert
//!     tokio::spawn(async move {
//!         notifier.notify_match_created(&json!({"id": 1})).await;
//!     });
//!
//!     serve(state, &config.server).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod websocket;

pub use api::{build_router, serve, serve_with_shutdown, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, WebSocketConfig};

pub use websocket::{
    AdmissionError, AdmissionGate, AdmissionPolicy, AdmissionRequest, AllowAll, ClientMessage,
    ConnectionHub, Decision, DenyReason, HeartbeatMonitor, HubConfig, HubError, MatchNotifier,
    ServerMessage, TopicId,
};
