//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, WebSocketConfig};
use crate::websocket::{AdmissionGate, ConnectionHub, MatchNotifier};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection registry and match subscriptions
    pub hub: Arc<ConnectionHub>,
    /// Admission check run before every WebSocket handshake
    pub gate: AdmissionGate,
    /// WebSocket settings
    pub websocket: Arc<WebSocketConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Wall-clock start time reported by the health endpoint
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState that admits every upgrade
    pub fn new(config: &Config) -> Self {
        Self::with_gate(config, AdmissionGate::open())
    }

    /// Create AppState with a custom admission gate
    pub fn with_gate(config: &Config, gate: AdmissionGate) -> Self {
        Self {
            hub: Arc::new(ConnectionHub::new(config.websocket.hub_config())),
            gate,
            websocket: Arc::new(config.websocket.clone()),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Hooks for the match and commentary writers
    pub fn notifier(&self) -> MatchNotifier {
        MatchNotifier::new(Arc::clone(&self.hub))
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
