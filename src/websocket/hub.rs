//! WebSocket Connection Hub
//!
//! Owns the connection registry and the match subscription index, and
//! performs every fan-out. One hub exists per server instance.
//!
//! Lock order is always `connections` before `subscriptions`. No lock is
//! held across an await on I/O: sends go through bounded per-connection
//! queues with `try_send`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::{ServerMessage, TopicId};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Manages all WebSocket connections and match subscriptions
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Match subscriptions: TopicId → Set of ConnectionIds
    subscriptions: RwLock<HashMap<TopicId, HashSet<ConnectionId>>>,
    /// Cancelled once when the hub shuts down; parent of every connection token
    shutdown: CancellationToken,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            outbound_buffer: 64,
        }
    }
}

/// Frame queued for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized JSON text frame, shared by every recipient of a broadcast
    Text(Arc<str>),
    /// Liveness probe
    Ping,
}

/// Registry entry for a live connection
struct ConnectionHandle {
    sender: mpsc::Sender<Outbound>,
    alive: Arc<AtomicBool>,
    terminate: CancellationToken,
    subscriptions: HashSet<TopicId>,
}

/// Everything a connection task needs after registering
pub struct Registration {
    pub id: ConnectionId,
    /// Frames to write to the socket
    pub outbound: mpsc::Receiver<Outbound>,
    /// Liveness flag; set on every pong
    pub alive: Arc<AtomicBool>,
    /// Cancelled when the connection must be dropped without a close handshake
    pub terminate: CancellationToken,
}

/// Outcome of one heartbeat sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub pinged: usize,
    pub terminated: Vec<ConnectionId>,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// The connection starts alive with no subscriptions. Fails once the
    /// connection limit is reached or the hub is shutting down.
    pub async fn register(&self) -> Result<Registration, HubError> {
        if self.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }

        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        let (sender, outbound) = mpsc::channel(self.config.outbound_buffer.max(1));
        let alive = Arc::new(AtomicBool::new(true));
        let terminate = self.shutdown.child_token();

        connections.insert(
            id.clone(),
            ConnectionHandle {
                sender,
                alive: Arc::clone(&alive),
                terminate: terminate.clone(),
                subscriptions: HashSet::new(),
            },
        );
        drop(connections);

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(Registration {
            id,
            outbound,
            alive,
            terminate,
        })
    }

    /// Unregister a connection and clean up its subscriptions
    ///
    /// Safe to call more than once; later calls are no-ops.
    pub async fn unregister(&self, id: &str) {
        let mut connections = self.connections.write().await;
        let Some(handle) = connections.remove(id) else {
            return;
        };

        let mut subs = self.subscriptions.write().await;
        for topic in &handle.subscriptions {
            remove_subscriber(&mut subs, *topic, id);
        }

        tracing::info!(
            connection_id = %id,
            topics = handle.subscriptions.len(),
            "WebSocket disconnected"
        );
    }

    /// Subscribe a connection to a match
    ///
    /// Subscribing twice is idempotent.
    pub async fn subscribe(&self, id: &str, topic: TopicId) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        handle.subscriptions.insert(topic);
        subs.entry(topic).or_default().insert(id.to_string());

        tracing::debug!(connection_id = %id, match_id = topic, "Subscribed to match");
        Ok(())
    }

    /// Unsubscribe a connection from a match
    ///
    /// Unsubscribing from a match the connection never joined is a no-op.
    pub async fn unsubscribe(&self, id: &str, topic: TopicId) -> Result<(), HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        if handle.subscriptions.remove(&topic) {
            let mut subs = self.subscriptions.write().await;
            remove_subscriber(&mut subs, topic, id);
            tracing::debug!(connection_id = %id, match_id = topic, "Unsubscribed from match");
        }

        Ok(())
    }

    /// Send a message directly to a specific connection
    ///
    /// Never waits: a full queue or a connection that is being torn down
    /// fails with [`HubError::SendFailed`].
    pub async fn send_to(&self, id: &str, message: &ServerMessage) -> Result<(), HubError> {
        let text: Arc<str> = message
            .to_text()
            .map_err(|e| HubError::Serialize(e.to_string()))?
            .into();

        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;
        if handle.terminate.is_cancelled() {
            return Err(HubError::SendFailed);
        }

        handle
            .sender
            .try_send(Outbound::Text(text))
            .map_err(|_| HubError::SendFailed)
    }

    /// Push a message to every registered connection
    ///
    /// Returns how many connections the frame was queued for. Connections
    /// that cannot take the frame are skipped, never removed.
    pub async fn broadcast_to_all(&self, message: &ServerMessage) -> usize {
        let Some(text) = serialize(message) else {
            return 0;
        };

        let connections = self.connections.read().await;
        let delivered = connections
            .iter()
            .filter(|(id, handle)| deliver(id, handle, &text))
            .count();

        tracing::trace!(recipients = delivered, "Broadcast to all");
        delivered
    }

    /// Push a message to every subscriber of a match
    ///
    /// A match with no subscribers is a silent no-op.
    pub async fn broadcast_to_topic(&self, topic: TopicId, message: &ServerMessage) -> usize {
        let connections = self.connections.read().await;
        let subs = self.subscriptions.read().await;

        let Some(subscribers) = subs.get(&topic) else {
            return 0;
        };
        let Some(text) = serialize(message) else {
            return 0;
        };

        let delivered = subscribers
            .iter()
            .filter_map(|id| connections.get_key_value(id))
            .filter(|(id, handle)| deliver(id, handle, &text))
            .count();

        tracing::trace!(match_id = topic, recipients = delivered, "Broadcast to match");
        delivered
    }

    /// Run one heartbeat pass over every connection
    ///
    /// Connections that have not answered the previous ping are terminated
    /// and removed from the index before this returns; the rest are marked
    /// not-alive and pinged.
    pub async fn heartbeat_sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        {
            let connections = self.connections.read().await;
            for (id, handle) in connections.iter() {
                if !handle.alive.swap(false, Ordering::AcqRel) {
                    report.terminated.push(id.clone());
                    continue;
                }
                // A full queue means the peer is already behind; the missed
                // pong is caught next sweep.
                if handle.sender.try_send(Outbound::Ping).is_ok() {
                    report.pinged += 1;
                }
            }
        }

        for id in &report.terminated {
            self.terminate(id).await;
        }

        report
    }

    /// Force-close a connection and drop it from the registry and index
    pub async fn terminate(&self, id: &str) {
        let token = {
            let connections = self.connections.read().await;
            connections.get(id).map(|handle| handle.terminate.clone())
        };

        if let Some(token) = token {
            tracing::info!(connection_id = %id, "Terminating unresponsive connection");
            token.cancel();
            self.unregister(id).await;
        }
    }

    /// Token cancelled when the hub shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Terminate every connection and refuse new ones
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Shutting down connection hub");
            self.shutdown.cancel();
        }
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get the number of matches with at least one subscriber
    pub async fn topic_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Get subscriber count for a match
    pub async fn subscriber_count(&self, topic: TopicId) -> usize {
        self.subscriptions
            .read()
            .await
            .get(&topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Check whether a match has an entry in the index
    pub async fn has_topic(&self, topic: TopicId) -> bool {
        self.subscriptions.read().await.contains_key(&topic)
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Remove one subscriber, pruning the match entry once it is empty
fn remove_subscriber(
    subs: &mut HashMap<TopicId, HashSet<ConnectionId>>,
    topic: TopicId,
    id: &str,
) {
    if let Some(subscribers) = subs.get_mut(&topic) {
        subscribers.remove(id);
        if subscribers.is_empty() {
            subs.remove(&topic);
        }
    }
}

fn serialize(message: &ServerMessage) -> Option<Arc<str>> {
    match message.to_text() {
        Ok(text) => Some(text.into()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize broadcast");
            None
        }
    }
}

/// Queue a frame without waiting; reports whether it was accepted
fn deliver(id: &str, handle: &ConnectionHandle, text: &Arc<str>) -> bool {
    if handle.terminate.is_cancelled() {
        return false;
    }
    match handle.sender.try_send(Outbound::Text(Arc::clone(text))) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(connection_id = %id, "Outbound queue full, dropping frame");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Failed to serialize message: {0}")]
    Serialize(String),

    #[error("Failed to send message")]
    SendFailed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn commentary(data: serde_json::Value) -> ServerMessage {
        ServerMessage::Commentary { data }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 10_000);
        assert_eq!(config.outbound_buffer, 64);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::default();

        let reg = hub.register().await.unwrap();
        assert!(!reg.id.is_empty());
        assert!(reg.alive.load(Ordering::Acquire));
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&reg.id).await;
        assert_eq!(hub.connection_count().await, 0);

        // Second unregister is a no-op
        hub.unregister(&reg.id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let hub = ConnectionHub::default();
        let reg = hub.register().await.unwrap();

        hub.subscribe(&reg.id, 42).await.unwrap();
        assert_eq!(hub.subscriber_count(42).await, 1);
        assert!(hub.has_topic(42).await);

        hub.unsubscribe(&reg.id, 42).await.unwrap();
        assert_eq!(hub.subscriber_count(42).await, 0);
        assert!(!hub.has_topic(42).await);
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let hub = ConnectionHub::default();
        let reg = hub.register().await.unwrap();

        hub.subscribe(&reg.id, 42).await.unwrap();
        hub.subscribe(&reg.id, 42).await.unwrap();
        assert_eq!(hub.subscriber_count(42).await, 1);

        // One unsubscribe fully removes it
        hub.unsubscribe(&reg.id, 42).await.unwrap();
        assert!(!hub.has_topic(42).await);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_topic_is_noop() {
        let hub = ConnectionHub::default();
        let a = hub.register().await.unwrap();
        let b = hub.register().await.unwrap();

        hub.subscribe(&b.id, 5).await.unwrap();
        hub.unsubscribe(&a.id, 5).await.unwrap();
        hub.unsubscribe(&a.id, 99).await.unwrap();

        assert_eq!(hub.subscriber_count(5).await, 1);
        assert!(!hub.has_topic(99).await);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_connection() {
        let hub = ConnectionHub::default();
        let result = hub.subscribe("missing", 1).await;
        assert!(matches!(result, Err(HubError::ConnectionNotFound)));
        assert_eq!(hub.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_topic_key_exists_iff_non_empty() {
        let hub = ConnectionHub::default();
        let a = hub.register().await.unwrap();
        let b = hub.register().await.unwrap();

        let (a, b) = (a.id.as_str(), b.id.as_str());
        let ops = [
            (a, true, 1),
            (b, true, 1),
            (a, true, 2),
            (a, false, 1),
            (b, false, 2),
            (b, false, 1),
            (a, true, 1),
            (a, false, 2),
        ];

        for (id, sub, topic) in ops {
            if sub {
                hub.subscribe(id, topic).await.unwrap();
            } else {
                hub.unsubscribe(id, topic).await.unwrap();
            }
            for t in [1, 2] {
                assert_eq!(hub.has_topic(t).await, hub.subscriber_count(t).await > 0);
            }
        }

        assert!(hub.has_topic(1).await);
        assert!(!hub.has_topic(2).await);
    }

    #[tokio::test]
    async fn test_unregister_cleans_every_topic() {
        let hub = ConnectionHub::default();
        let a = hub.register().await.unwrap();
        let b = hub.register().await.unwrap();

        for topic in [1, 2, 3] {
            hub.subscribe(&a.id, topic).await.unwrap();
        }
        hub.subscribe(&b.id, 3).await.unwrap();

        hub.unregister(&a.id).await;

        assert!(!hub.has_topic(1).await);
        assert!(!hub.has_topic(2).await);
        assert_eq!(hub.subscriber_count(3).await, 1);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 2,
            outbound_buffer: 4,
        });

        let _a = hub.register().await.unwrap();
        let _b = hub.register().await.unwrap();
        let result = hub.register().await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_broadcast_to_topic_reaches_only_subscribers() {
        let hub = ConnectionHub::default();
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        hub.subscribe(&a.id, 42).await.unwrap();

        let sent = hub
            .broadcast_to_topic(42, &commentary(json!({"foo": "bar"})))
            .await;
        assert_eq!(sent, 1);

        let frame = a.outbound.try_recv().unwrap();
        assert_eq!(
            frame,
            Outbound::Text(r#"{"type":"commentary","data":{"foo":"bar"}}"#.into())
        );
        assert!(b.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_topic_is_noop() {
        let hub = ConnectionHub::default();
        let mut a = hub.register().await.unwrap();

        let sent = hub.broadcast_to_topic(404, &commentary(json!({}))).await;
        assert_eq!(sent, 0);
        assert!(a.outbound.try_recv().is_err());
        assert!(!hub.has_topic(404).await);
    }

    #[tokio::test]
    async fn test_broadcast_to_all_skips_closed_connections() {
        let hub = ConnectionHub::default();
        let mut open: Vec<Registration> = Vec::new();
        for _ in 0..3 {
            open.push(hub.register().await.unwrap());
        }

        // Closed but not yet cleaned up: its receiver is gone
        let closed = hub.register().await.unwrap();
        let closed_id = closed.id.clone();
        drop(closed);

        let message = ServerMessage::MatchCreated { data: json!({"id": 7}) };
        let sent = hub.broadcast_to_all(&message).await;
        assert_eq!(sent, 3);

        for reg in open.iter_mut() {
            assert!(matches!(reg.outbound.try_recv(), Ok(Outbound::Text(_))));
        }

        // A failed send never removes the connection
        assert_eq!(hub.connection_count().await, 4);
        hub.unregister(&closed_id).await;
        assert_eq!(hub.connection_count().await, 3);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block_other_recipients() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 10,
            outbound_buffer: 1,
        });
        let mut slow = hub.register().await.unwrap();
        let mut fast = hub.register().await.unwrap();
        hub.subscribe(&slow.id, 1).await.unwrap();
        hub.subscribe(&fast.id, 1).await.unwrap();

        assert_eq!(hub.broadcast_to_topic(1, &commentary(json!(1))).await, 2);
        fast.outbound.try_recv().unwrap();

        // slow never drained; its second frame is dropped
        assert_eq!(hub.broadcast_to_topic(1, &commentary(json!(2))).await, 1);
        assert!(matches!(fast.outbound.try_recv(), Ok(Outbound::Text(_))));

        slow.outbound.try_recv().unwrap();
        assert!(slow.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_sweep_pings_then_terminates() {
        let hub = ConnectionHub::default();
        let mut silent = hub.register().await.unwrap();
        let mut responsive = hub.register().await.unwrap();
        hub.subscribe(&silent.id, 9).await.unwrap();
        hub.subscribe(&responsive.id, 9).await.unwrap();

        let report = hub.heartbeat_sweep().await;
        assert_eq!(report.pinged, 2);
        assert!(report.terminated.is_empty());
        assert_eq!(silent.outbound.try_recv().unwrap(), Outbound::Ping);
        assert_eq!(responsive.outbound.try_recv().unwrap(), Outbound::Ping);

        // Only one of them answers
        responsive.alive.store(true, Ordering::Release);

        let report = hub.heartbeat_sweep().await;
        assert_eq!(report.pinged, 1);
        assert_eq!(report.terminated, vec![silent.id.clone()]);
        assert!(silent.terminate.is_cancelled());
        assert!(!responsive.terminate.is_cancelled());

        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.subscriber_count(9).await, 1);
    }

    #[tokio::test]
    async fn test_send_to() {
        let hub = ConnectionHub::default();
        let mut reg = hub.register().await.unwrap();

        hub.send_to(&reg.id, &ServerMessage::Welcome).await.unwrap();
        assert_eq!(
            reg.outbound.try_recv().unwrap(),
            Outbound::Text(r#"{"type":"welcome"}"#.into())
        );

        let missing = hub.send_to("nope", &ServerMessage::Welcome).await;
        assert!(matches!(missing, Err(HubError::ConnectionNotFound)));
    }

    #[tokio::test]
    async fn test_send_to_never_waits() {
        let hub = ConnectionHub::new(HubConfig {
            max_connections: 10,
            outbound_buffer: 1,
        });
        let reg = hub.register().await.unwrap();
        let reply = ServerMessage::Subscribed { match_id: 1 };

        hub.send_to(&reg.id, &reply).await.unwrap();
        let full = hub.send_to(&reg.id, &reply).await;
        assert!(matches!(full, Err(HubError::SendFailed)));

        let doomed = hub.register().await.unwrap();
        doomed.terminate.cancel();
        let result = hub.send_to(&doomed.id, &reply).await;
        assert!(matches!(result, Err(HubError::SendFailed)));
    }

    #[tokio::test]
    async fn test_broadcast_shares_one_payload() {
        let hub = ConnectionHub::default();
        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        let message = ServerMessage::MatchCreated { data: json!({"id": 1}) };
        assert_eq!(hub.broadcast_to_all(&message).await, 2);

        let (Ok(Outbound::Text(first)), Ok(Outbound::Text(second))) =
            (a.outbound.try_recv(), b.outbound.try_recv())
        else {
            panic!("Expected text frames");
        };
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_connections() {
        let hub = ConnectionHub::default();
        let reg = hub.register().await.unwrap();

        hub.shutdown();
        assert!(reg.terminate.is_cancelled());
        assert!(matches!(hub.register().await, Err(HubError::ShuttingDown)));
    }
}
