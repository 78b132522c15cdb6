//! Match Notifier
//!
//! The hooks the match/commentary CRUD layer calls after a successful
//! write. Delivery is fire-and-forget.

use serde::Serialize;
use std::sync::Arc;

use super::hub::ConnectionHub;
use super::messages::{ServerMessage, TopicId};

/// Cloneable handle for pushing record events to connected clients
#[derive(Clone)]
pub struct MatchNotifier {
    hub: Arc<ConnectionHub>,
}

impl MatchNotifier {
    pub fn new(hub: Arc<ConnectionHub>) -> Self {
        Self { hub }
    }

    /// Announce a newly created match to every connection
    pub async fn notify_match_created<T: Serialize>(&self, record: &T) -> usize {
        match serde_json::to_value(record) {
            Ok(data) => {
                self.hub
                    .broadcast_to_all(&ServerMessage::MatchCreated { data })
                    .await
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode match record");
                0
            }
        }
    }

    /// Push a commentary entry to the subscribers of its match
    pub async fn notify_commentary<T: Serialize>(&self, match_id: TopicId, record: &T) -> usize {
        match serde_json::to_value(record) {
            Ok(data) => {
                self.hub
                    .broadcast_to_topic(match_id, &ServerMessage::Commentary { data })
                    .await
            }
            Err(e) => {
                tracing::error!(match_id, error = %e, "Failed to encode commentary record");
                0
            }
        }
    }
}
