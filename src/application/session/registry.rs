//! Session registry — live charge point connections keyed by identity

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{Connection, EvictedSession};
use crate::support::errors::SessionError;
use crate::support::ocpp_frame::OcppFrame;

/// Thread-safe registry of active charge point sessions
pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    next_connection_id: AtomicU64,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

/// Outcome of [`SessionRegistry::register`]
#[derive(Debug)]
pub struct RegisterResult {
    /// Pass back to [`SessionRegistry::unregister`]
    pub connection_id: u64,
    /// Previous session of the same charge point, if any
    pub evicted: Option<EvictedSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn shared() -> SharedSessionRegistry {
        Arc::new(Self::new())
    }

    /// Register a connection, replacing any previous one for the same id.
    pub fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> RegisterResult {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::new(connection_id, charge_point_id, sender);

        let evicted = self
            .sessions
            .insert(charge_point_id.to_string(), connection)
            .map(|old| old.evicted());

        match &evicted {
            Some(old) => warn!(
                charge_point_id,
                connection_id,
                evicted_connection_id = old.connection_id,
                "Charge point reconnected, previous session evicted"
            ),
            None => info!(charge_point_id, connection_id, "Registered charge point session"),
        }
        metrics::gauge!("ocpp_connections_active").set(self.sessions.len() as f64);

        RegisterResult {
            connection_id,
            evicted,
        }
    }

    /// Remove the session only if it still belongs to `connection_id`.
    ///
    /// Returns `false` when a newer connection has taken over.
    pub fn unregister(&self, charge_point_id: &str, connection_id: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, conn| conn.connection_id == connection_id)
            .is_some();

        if removed {
            info!(charge_point_id, connection_id, "Unregistered charge point session");
            metrics::gauge!("ocpp_connections_active").set(self.sessions.len() as f64);
        } else {
            debug!(
                charge_point_id,
                connection_id, "Session already replaced, nothing to unregister"
            );
        }
        removed
    }

    /// Queue raw text for a charge point.
    pub fn send_to(&self, charge_point_id: &str, message: String) -> Result<(), SessionError> {
        let conn = self
            .sessions
            .get(charge_point_id)
            .ok_or_else(|| SessionError::NotConnected(charge_point_id.to_string()))?;
        conn.send(message)
            .map_err(|_| SessionError::SendFailed(charge_point_id.to_string()))
    }

    pub fn send(&self, charge_point_id: &str, frame: &OcppFrame) -> Result<(), SessionError> {
        self.send_to(charge_point_id, frame.serialize())
    }

    pub fn touch(&self, charge_point_id: &str) {
        if let Some(mut conn) = self.sessions.get_mut(charge_point_id) {
            conn.touch();
        }
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
