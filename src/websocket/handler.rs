//! WebSocket Handler
//!
//! Handles upgrade requests and runs one task per established connection.
//!
//! A connection moves through `Handshaking → Open → Closing → Closed`.
//! It leaves `Open` on a peer close, end of stream, transport error,
//! heartbeat termination or server shutdown; whichever path it takes, it
//! is unregistered from the hub before reaching `Closed`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::gate::AdmissionRequest;
use super::hub::{ConnectionHub, ConnectionId, HubError, Outbound, Registration};
use super::messages::ServerMessage;
use super::router::route_frame;
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// Runs the admission gate first; a rejected request gets a plain HTTP
/// error response and the handshake never starts.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let request = AdmissionRequest {
        method,
        path: uri.path().to_string(),
        headers,
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr),
    };

    if let Err(rejection) = state.gate.check(&request).await {
        return rejection.into_response();
    }

    let hub = Arc::clone(&state.hub);
    ws.max_message_size(state.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Lifecycle states of a connection, in the only order they can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Handshaking,
    Open,
    Closing,
    Closed,
}

/// Why a connection left the `Open` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    StreamEnded,
    TransportError,
    Terminated,
    /// Registration failed; the connection never opened
    Refused,
}

struct Lifecycle {
    id: Option<ConnectionId>,
    state: ConnectionState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            id: None,
            state: ConnectionState::Handshaking,
        }
    }

    /// Move forward to `next`; returns false and stays put otherwise
    fn advance(&mut self, next: ConnectionState) -> bool {
        if next <= self.state {
            tracing::warn!(
                connection_id = ?self.id,
                from = ?self.state,
                to = ?next,
                "Ignoring backwards state change"
            );
            return false;
        }
        tracing::trace!(
            connection_id = ?self.id,
            from = ?self.state,
            to = ?next,
            "Connection state change"
        );
        self.state = next;
        true
    }

    /// Walk through `Closing` to `Closed` from wherever the connection is
    fn close(&mut self, reason: CloseReason) {
        if self.state < ConnectionState::Closing {
            self.advance(ConnectionState::Closing);
        }
        if self.state < ConnectionState::Closed {
            self.advance(ConnectionState::Closed);
        }
        tracing::debug!(connection_id = ?self.id, reason = ?reason, "Connection closed");
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>) {
    let mut lifecycle = Lifecycle::new();
    let (mut sink, stream) = socket.split();

    let Registration {
        id,
        outbound,
        alive,
        terminate,
    } = match hub.register().await {
        Ok(registration) => registration,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register WebSocket connection");
            let error_msg = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Ok(text) = error_msg.to_text() {
                let _ = sink.send(Message::Text(text)).await;
            }
            let _ = sink.close().await;
            lifecycle.close(CloseReason::Refused);
            return;
        }
    };
    lifecycle.id = Some(id.clone());

    let welcome = ServerMessage::Welcome.to_text().unwrap_or_default();
    if sink.send(Message::Text(welcome)).await.is_err() {
        hub.unregister(&id).await;
        lifecycle.close(CloseReason::TransportError);
        return;
    }
    lifecycle.advance(ConnectionState::Open);

    let reason = run_open(&hub, &id, sink, stream, outbound, alive, terminate).await;
    lifecycle.advance(ConnectionState::Closing);

    hub.unregister(&id).await;
    lifecycle.close(reason);
}

/// Drive an open connection until it leaves the `Open` state
async fn run_open(
    hub: &Arc<ConnectionHub>,
    id: &ConnectionId,
    sink: SplitSink<WebSocket, Message>,
    stream: SplitStream<WebSocket>,
    outbound: mpsc::Receiver<Outbound>,
    alive: Arc<AtomicBool>,
    terminate: CancellationToken,
) -> CloseReason {
    let mut send_task = tokio::spawn(write_frames(sink, outbound, id.clone()));
    let mut recv_task = tokio::spawn(read_frames(stream, Arc::clone(hub), id.clone(), alive));

    let reason = tokio::select! {
        _ = terminate.cancelled() => CloseReason::Terminated,
        _ = &mut send_task => CloseReason::TransportError,
        result = &mut recv_task => result.unwrap_or(CloseReason::TransportError),
    };

    // Aborting drops both socket halves; for termination and transport
    // errors that is the forced close.
    send_task.abort();
    recv_task.abort();

    reason
}

/// Forward queued frames to the socket until the queue or socket closes
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    id: ConnectionId,
) {
    while let Some(frame) = outbound.recv().await {
        let message = match frame {
            Outbound::Text(text) => Message::Text(text.to_string()),
            Outbound::Ping => Message::Ping(Vec::new()),
        };
        if let Err(e) = sink.send(message).await {
            tracing::debug!(connection_id = %id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Consume inbound frames until the peer goes away
async fn read_frames(
    mut stream: SplitStream<WebSocket>,
    hub: Arc<ConnectionHub>,
    id: ConnectionId,
    alive: Arc<AtomicBool>,
) -> CloseReason {
    let mut peer_closed = false;

    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                if peer_closed {
                    break;
                }
                tracing::debug!(connection_id = %id, error = %e, "WebSocket receive error");
                return CloseReason::TransportError;
            }
        };

        match message {
            Message::Text(text) => handle_text(&hub, &id, &text).await,
            Message::Binary(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                handle_text(&hub, &id, &text).await;
            }
            Message::Pong(_) => alive.store(true, Ordering::Release),
            // Pongs to client pings are sent by the transport
            Message::Ping(_) => {}
            Message::Close(_) => {
                tracing::debug!(connection_id = %id, "Client requested close");
                // Keep reading so the close reply gets flushed
                peer_closed = true;
            }
        }
    }

    if peer_closed {
        CloseReason::PeerClosed
    } else {
        CloseReason::StreamEnded
    }
}

async fn handle_text(hub: &ConnectionHub, id: &str, text: &str) {
    let Some(reply) = route_frame(hub, id, text).await else {
        return;
    };

    match hub.send_to(id, &reply).await {
        Ok(()) => {}
        Err(HubError::SendFailed) => {
            tracing::warn!(connection_id = %id, "Outbound queue unavailable, dropping reply");
        }
        Err(e) => tracing::debug!(connection_id = %id, error = %e, "Reply not sent"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state, ConnectionState::Handshaking);

        lifecycle.id = Some("abc".to_string());
        assert!(lifecycle.advance(ConnectionState::Open));
        assert!(lifecycle.advance(ConnectionState::Closing));
        lifecycle.close(CloseReason::PeerClosed);
        assert_eq!(lifecycle.state, ConnectionState::Closed);
    }

    #[test]
    fn test_lifecycle_never_moves_backwards() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.advance(ConnectionState::Open));
        assert!(!lifecycle.advance(ConnectionState::Handshaking));
        assert!(!lifecycle.advance(ConnectionState::Open));
        assert_eq!(lifecycle.state, ConnectionState::Open);
    }

    #[test]
    fn test_refused_connection_reaches_closed() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.close(CloseReason::Refused);
        assert_eq!(lifecycle.state, ConnectionState::Closed);

        // Closing again is harmless
        lifecycle.close(CloseReason::Refused);
        assert_eq!(lifecycle.state, ConnectionState::Closed);
    }
}
