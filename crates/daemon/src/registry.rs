//! Tracks open client sessions and fans status events out to all of them.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::messages::ServerMessage;

/// Set of currently open client sessions, keyed by session id. Sessions
/// register on accept and unregister from their own close path; broadcasts
/// may run concurrently with either.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: DashMap<Uuid, mpsc::Sender<ServerMessage>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid, tx: mpsc::Sender<ServerMessage>) {
        self.sessions.insert(id, tx);
        debug!("registered client {} ({} open)", id, self.sessions.len());
    }

    pub fn unregister(&self, id: &Uuid) {
        self.sessions.remove(id);
        debug!("unregistered client {} ({} open)", id, self.sessions.len());
    }

    /// Deliver `event` to every open session. Sessions whose channel is full
    /// or closed are skipped; their own close handler removes them.
    pub fn broadcast(&self, event: ServerMessage) {
        for session in self.sessions.iter() {
            let _ = session.value().try_send(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use car_link::LinkStatus;

    #[tokio::test]
    async fn broadcast_reaches_all_open_sessions() {
        let registry = ClientRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx_a);
        registry.register(Uuid::new_v4(), tx_b);

        registry.broadcast(ServerMessage::status(&LinkStatus::connected()));

        assert!(matches!(
            rx_a.recv().await,
            Some(ServerMessage::Status { is_connected: true, .. })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ServerMessage::Status { is_connected: true, .. })
        ));
    }

    #[tokio::test]
    async fn unregistered_session_no_longer_receives() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(id, tx);
        registry.unregister(&id);
        assert!(registry.is_empty());

        registry.broadcast(ServerMessage::status(&LinkStatus::disconnected()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unwritable_session_is_skipped_silently() {
        let registry = ClientRegistry::new();
        let (full_tx, _full_rx) = mpsc::channel(1);
        full_tx
            .try_send(ServerMessage::status(&LinkStatus::disconnected()))
            .unwrap();
        let (open_tx, mut open_rx) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), full_tx);
        registry.register(Uuid::new_v4(), open_tx);

        // The full session is skipped without failing the broadcast.
        registry.broadcast(ServerMessage::status(&LinkStatus::connected()));
        assert!(matches!(
            open_rx.recv().await,
            Some(ServerMessage::Status { is_connected: true, .. })
        ));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn register_is_idempotent_per_id() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);
        registry.register(id, tx_a);
        registry.register(id, tx_b);
        assert_eq!(registry.len(), 1);
    }
}
