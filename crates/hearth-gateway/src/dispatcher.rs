use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use hearth_types::events::GatewayEvent;

/// Manages all connected clients and fans events out to them.
///
/// Thread-scoped events (messages, receipts, typing) go through the broadcast
/// channel and are filtered per connection against its subscription set.
/// Notification payloads go through per-user targeted channels so only the
/// intended recipient sees them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — every connection receives every
    /// event and filters by its own subscriptions
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: profile_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients. Best-effort — a send with
    /// no receivers is not an error.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    /// A newer connection for the same profile takes over the channel.
    pub async fn register_user_channel(
        &self,
        profile_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(profile_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches —
    /// a reconnect may already own the slot.
    pub async fn unregister_user_channel(&self, profile_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&profile_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&profile_id);
            }
        }
    }

    /// Send a targeted event to a specific user. Dropped silently if they are
    /// not connected — the notification service covers offline delivery.
    pub async fn send_to_user(&self, profile_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&profile_id) {
            let _ = tx.send(event);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing_event(thread_id: Uuid, profile_id: Uuid) -> GatewayEvent {
        GatewayEvent::TypingStart {
            thread_id,
            profile_id,
            name: "Ana".into(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();

        let thread_id = Uuid::new_v4();
        dispatcher.broadcast(typing_event(thread_id, Uuid::new_v4()));

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.thread_id(), Some(thread_id));
        }
    }

    #[tokio::test]
    async fn targeted_send_only_reaches_recipient() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_user(
                alice,
                GatewayEvent::Notification {
                    recipient_id: alice,
                    sender_name: "Ben".into(),
                    preview: "Pickup at 6pm".into(),
                    thread_id: Uuid::new_v4(),
                },
            )
            .await;

        assert!(alice_rx.recv().await.is_some());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_conn_id_does_not_unregister_newer_connection() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(alice).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(alice).await;

        // The old connection's teardown must not evict the new channel.
        dispatcher.unregister_user_channel(alice, old_conn).await;

        dispatcher
            .send_to_user(alice, typing_event(Uuid::new_v4(), alice))
            .await;
        assert!(new_rx.recv().await.is_some());
    }
}
