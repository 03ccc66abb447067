//! Envelope fan-out to connected clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use station_core::envelope::Envelope;
use station_core::ids::ClientId;

use super::connection::ClientConnection;

/// Maximum lifetime drops before a slow client is forcibly disconnected.
const MAX_TOTAL_DROPS: u64 = 100;

/// Connection registry and broadcast fan-out.
///
/// Sends never block: each connection's queue is drained by its own
/// writer task, and a queue that stays full long enough to accumulate
/// [`MAX_TOTAL_DROPS`] drops gets the connection evicted.
pub struct BroadcastManager {
    connections: RwLock<HashMap<ClientId, Arc<ClientConnection>>>,
    /// Tracks the connection count without read-locking the map.
    active_count: AtomicUsize,
}

impl BroadcastManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write();
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evict a connection by id.
    pub fn remove(&self, id: &ClientId) {
        let mut conns = self.connections.write();
        if conns.remove(id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Send one envelope to a single client.
    pub fn send_to(&self, id: &ClientId, event: &str, data: &Value) {
        let Some(frame) = self.serialize(event, data) else {
            return;
        };
        let evict = {
            let conns = self.connections.read();
            match conns.get(id) {
                Some(conn) => !conn.send(frame) && self.note_drop(conn),
                None => false,
            }
        };
        if evict {
            self.remove(id);
        }
    }

    /// Fan one envelope out to every client except `origin`.
    pub fn broadcast_except(&self, origin: &ClientId, event: &str, data: &Value) {
        let Some(frame) = self.serialize(event, data) else {
            return;
        };
        let mut to_evict = Vec::new();
        {
            let conns = self.connections.read();
            let mut recipients = 0u32;
            for conn in conns.values() {
                if conn.id == *origin {
                    continue;
                }
                recipients += 1;
                if !conn.send(Arc::clone(&frame)) && self.note_drop(conn) {
                    to_evict.push(conn.id.clone());
                }
            }
            debug!(event, recipients, origin = %origin, "broadcast");
        }
        for id in &to_evict {
            self.remove(id);
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    fn serialize(&self, event: &str, data: &Value) -> Option<Arc<String>> {
        match Envelope::new(event, data.clone()).to_frame() {
            Ok(frame) => Some(Arc::new(frame)),
            Err(err) => {
                warn!(event, error = %err, "failed to serialize envelope");
                None
            }
        }
    }

    /// Record a failed send; `true` when the client crossed the eviction
    /// threshold.
    fn note_drop(&self, conn: &ClientConnection) -> bool {
        counter!("station_broadcast_drops_total").increment(1);
        let drops = conn.drop_count();
        if drops >= MAX_TOTAL_DROPS {
            warn!(conn_id = %conn.id, drops, "disconnecting slow client");
            true
        } else {
            warn!(conn_id = %conn.id, total_drops = drops, "client queue full, frame dropped");
            false
        }
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}
