//! Admission Gate
//!
//! Decides, before the WebSocket handshake starts, whether an upgrade
//! request may proceed. The decision itself comes from an external
//! [`AdmissionPolicy`]; the gate only maps it onto an HTTP rejection.

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

/// Outcome reported by an admission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Why a policy refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    RateLimit,
    Bot,
    Other,
}

/// The parts of an upgrade request a policy may inspect
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

/// Failure of the decision call itself
#[derive(Debug, Error)]
#[error("Admission check failed: {0}")]
pub struct AdmissionError(pub String);

/// External decision engine consulted for every upgrade attempt
#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn decide(&self, request: &AdmissionRequest) -> Result<Decision, AdmissionError>;
}

/// Policy that admits every request
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AdmissionPolicy for AllowAll {
    async fn decide(&self, _request: &AdmissionRequest) -> Result<Decision, AdmissionError> {
        Ok(Decision::Allow)
    }
}

/// Rejection written instead of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub message: &'static str,
}

impl Rejection {
    pub const RATE_LIMITED: Rejection = Rejection {
        status: StatusCode::TOO_MANY_REQUESTS,
        message: "Too Many Requests",
    };
    pub const BOT: Rejection = Rejection {
        status: StatusCode::FORBIDDEN,
        message: "Bots Not Allowed",
    };
    pub const FORBIDDEN: Rejection = Rejection {
        status: StatusCode::FORBIDDEN,
        message: "Forbidden",
    };
    pub const UNAVAILABLE: Rejection = Rejection {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "Service Unavailable",
    };

    fn for_reason(reason: DenyReason) -> Self {
        match reason {
            DenyReason::RateLimit => Self::RATE_LIMITED,
            DenyReason::Bot => Self::BOT,
            DenyReason::Other => Self::FORBIDDEN,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message }).to_string();
        (
            self.status,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (header::CONNECTION, HeaderValue::from_static("close")),
            ],
            body,
        )
            .into_response()
    }
}

/// Gate in front of the upgrade handler
#[derive(Clone, Default)]
pub struct AdmissionGate {
    policy: Option<Arc<dyn AdmissionPolicy>>,
}

impl AdmissionGate {
    /// Gate backed by a policy
    pub fn new(policy: Arc<dyn AdmissionPolicy>) -> Self {
        Self {
            policy: Some(policy),
        }
    }

    /// Gate that admits everything without consulting anyone
    pub fn open() -> Self {
        Self { policy: None }
    }

    /// Check a request; `Ok` means the handshake may proceed
    pub async fn check(&self, request: &AdmissionRequest) -> Result<(), Rejection> {
        let Some(policy) = &self.policy else {
            return Ok(());
        };

        match policy.decide(request).await {
            Ok(Decision::Allow) => Ok(()),
            Ok(Decision::Deny(reason)) => {
                tracing::info!(
                    path = %request.path,
                    remote_addr = ?request.remote_addr,
                    reason = ?reason,
                    "WebSocket upgrade denied"
                );
                Err(Rejection::for_reason(reason))
            }
            Err(e) => {
                tracing::error!(
                    path = %request.path,
                    remote_addr = ?request.remote_addr,
                    error = %e,
                    "Admission policy error"
                );
                Err(Rejection::UNAVAILABLE)
            }
        }
    }
}
