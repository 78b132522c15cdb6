//! WebSocket Real-Time Match Feed
//!
//! Pushes match and commentary events to connected clients.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Connection registry and match subscription index
//! - **AdmissionGate**: Accepts or rejects upgrade requests before the handshake
//! - **Handler**: Per-connection task driving the socket
//! - **Router**: Applies subscribe/unsubscribe frames
//! - **HeartbeatMonitor**: Pings connections and reaps unresponsive ones
//! - **MatchNotifier**: Hooks called by the match/commentary writers
//!
//! ## Usage
//!
//! Clients connect to `/ws`, receive `{"type":"welcome"}` and subscribe to
//! matches by id:
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8000/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', matchId: 42}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   // subscribed, commentary, match_created, ...
//! };
//! ```

mod gate;
mod handler;
mod heartbeat;
mod hub;
mod messages;
mod notifier;
mod router;

pub use gate::{
    AdmissionError, AdmissionGate, AdmissionPolicy, AdmissionRequest, AllowAll, Decision,
    DenyReason, Rejection,
};
pub use handler::{websocket_handler, CloseReason, ConnectionState};
pub use heartbeat::{HeartbeatMonitor, DEFAULT_HEARTBEAT_INTERVAL};
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError, Outbound, Registration, SweepReport};
pub use messages::{ClientMessage, MalformedFrame, ServerMessage, TopicId, INVALID_JSON};
pub use notifier::MatchNotifier;
pub use router::route_frame;
