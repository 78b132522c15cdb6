//! Inbound Frame Router
//!
//! Turns raw client frames into subscription changes and the matching
//! acknowledgement frame.

use super::hub::ConnectionHub;
use super::messages::{ClientMessage, ServerMessage, INVALID_JSON};

/// Route one inbound text frame for a connection
///
/// Returns the reply to send back, if any. Malformed JSON yields an
/// `error` reply; ignored frames and frames for a connection that is no
/// longer registered yield nothing.
pub async fn route_frame(hub: &ConnectionHub, connection_id: &str, text: &str) -> Option<ServerMessage> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e.0,
                "Invalid client frame"
            );
            return Some(ServerMessage::Error {
                message: INVALID_JSON.to_string(),
            });
        }
    };

    match message {
        ClientMessage::Subscribe { match_id } => match hub.subscribe(connection_id, match_id).await {
            Ok(()) => Some(ServerMessage::Subscribed { match_id }),
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Subscribe failed");
                None
            }
        },
        ClientMessage::Unsubscribe { match_id } => {
            match hub.unsubscribe(connection_id, match_id).await {
                Ok(()) => Some(ServerMessage::Unsubscribed { match_id }),
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Unsubscribe failed");
                    None
                }
            }
        }
        ClientMessage::Ignored => {
            tracing::trace!(connection_id = %connection_id, "Ignoring unrecognised frame");
            None
        }
    }
}
