//! Connection registry: live charge point sessions by station id

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::ChargePointSession;

/// Concurrent map from station id to its live session. Inserted on
/// connect and removed on disconnect by the connection task; the command
/// bridge only looks up.
pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<ChargePointSession>>,
}

/// Shared, reference-counted registry
pub type SharedRegistry = Arc<ConnectionRegistry>;

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Wrap in `Arc` for shared ownership
    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    /// Register a session under its station id. A reconnecting station
    /// replaces its previous entry.
    pub fn register(&self, session: Arc<ChargePointSession>) {
        let station_id = session.station_id.clone();
        info!(station_id = station_id.as_str(), "Registering charge point session");
        self.sessions.insert(station_id, session);
    }

    pub fn unregister(&self, station_id: &str) {
        if self.sessions.remove(station_id).is_some() {
            info!(station_id, "Unregistered charge point session");
        } else {
            warn!(station_id, "Attempted to unregister unknown session");
        }
    }

    pub fn get(&self, station_id: &str) -> Option<Arc<ChargePointSession>> {
        self.sessions.get(station_id).map(|entry| entry.clone())
    }

    pub fn is_connected(&self, station_id: &str) -> bool {
        self.sessions.contains_key(station_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────
