//! WebSocket connection abstraction

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Outbound half of a live charge point connection
#[derive(Debug)]
pub struct Connection {
    /// Distinguishes reconnects of the same charge point
    pub connection_id: u64,
    pub charge_point_id: String,
    /// Drained by the connection's writer task
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Session replaced by a newer connection of the same charge point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedSession {
    pub connection_id: u64,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        connection_id: u64,
        charge_point_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            charge_point_id: charge_point_id.into(),
            sender,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Queue a message for the writer task. Fails once the writer is gone.
    pub fn send(&self, message: String) -> Result<(), mpsc::error::SendError<String>> {
        self.sender.send(message)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub(super) fn evicted(&self) -> EvictedSession {
        EvictedSession {
            connection_id: self.connection_id,
            connected_at: self.connected_at,
            last_activity: self.last_activity,
        }
    }
}
