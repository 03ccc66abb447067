//! Per-client connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use station_core::ids::ClientId;

/// One connected client: its id, the outbound queue drained by the
/// writer task, and whatever principal an auth layer has bound.
pub struct ClientConnection {
    /// Hub-issued connection id.
    pub id: ClientId,
    sender: mpsc::Sender<Arc<String>>,
    dropped: AtomicU64,
    principal: RwLock<Option<String>>,
}

impl ClientConnection {
    /// Wrap an outbound queue.
    #[must_use]
    pub fn new(id: ClientId, sender: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            sender,
            dropped: AtomicU64::new(0),
            principal: RwLock::new(None),
        }
    }

    /// Queue a frame without blocking. Returns `false` (and counts the
    /// drop) when the queue is full or the writer is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Lifetime count of frames this connection failed to accept.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Attach an authenticated principal to this connection.
    pub fn bind_principal(&self, principal: &str) {
        *self.principal.write() = Some(principal.to_string());
    }

    /// The bound principal, if an auth layer has set one.
    pub fn principal(&self) -> Option<String> {
        self.principal.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(buffer: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ClientConnection::new(ClientId::from("c1"), tx), rx)
    }

    #[tokio::test]
    async fn send_queues_frames() {
        let (conn, mut rx) = connection(4);
        assert!(conn.send(Arc::new("hello".to_string())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_counts_drops() {
        let (conn, _rx) = connection(1);
        assert!(conn.send(Arc::new("a".to_string())));
        assert!(!conn.send(Arc::new("b".to_string())));
        assert!(!conn.send(Arc::new("c".to_string())));
        assert_eq!(conn.drop_count(), 2);
    }

    #[tokio::test]
    async fn principal_binding_round_trips() {
        let (conn, _rx) = connection(1);
        assert_eq!(conn.principal(), None);
        conn.bind_principal("user:42");
        assert_eq!(conn.principal().as_deref(), Some("user:42"));
    }
}
