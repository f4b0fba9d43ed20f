use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod message_types;

struct RoomMember {
    connection_id: Uuid,
    #[allow(dead_code)]
    user_id: Uuid,
    tx: UnboundedSender<Message>,
}

/// Per-conversation room membership for connected sockets.
///
/// Constructor-injected and owned by the gateway instance, never global
/// state, so multiple gateways can be tested in isolation. Scoped to the
/// process; cross-instance fan-out would need an external backplane.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    // conversation_id -> connected members
    inner: Arc<RwLock<HashMap<Uuid, Vec<RoomMember>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room. Re-joining the same room replaces the
    /// stale entry for that connection.
    pub async fn join(
        &self,
        conversation_id: Uuid,
        connection_id: Uuid,
        user_id: Uuid,
        tx: UnboundedSender<Message>,
    ) {
        let mut guard = self.inner.write().await;
        let members = guard.entry(conversation_id).or_default();
        members.retain(|m| m.connection_id != connection_id);
        members.push(RoomMember {
            connection_id,
            user_id,
            tx,
        });
    }

    /// Removes a connection from every room it joined.
    pub async fn leave_all(&self, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, members| {
            members.retain(|m| m.connection_id != connection_id);
            !members.is_empty()
        });
    }

    /// Sends to every connection in the room, pruning closed senders.
    /// Delivery is at-most-once per connected socket; no replay queue.
    pub async fn broadcast(&self, conversation_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.get_mut(&conversation_id) {
            members.retain(|m| m.tx.send(msg.clone()).is_ok());
        }
    }

    pub async fn room_size(&self, conversation_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&conversation_id).map_or(0, |m| m.len())
    }

    /// Whether the connection currently belongs to the room.
    pub async fn is_member(&self, conversation_id: Uuid, connection_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.get(&conversation_id).map_or(false, |members| {
            members.iter().any(|m| m.connection_id == connection_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn join_broadcast_and_implicit_cleanup() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        registry
            .join(conversation, conn_a, Uuid::new_v4(), tx_a)
            .await;
        registry
            .join(conversation, conn_b, Uuid::new_v4(), tx_b)
            .await;
        assert_eq!(registry.room_size(conversation).await, 2);

        registry
            .broadcast(conversation, Message::Text("hello".into()))
            .await;
        assert!(matches!(rx_a.recv().await, Some(Message::Text(t)) if t == "hello"));
        assert!(matches!(rx_b.recv().await, Some(Message::Text(t)) if t == "hello"));

        // Closed receiver is pruned on the next broadcast.
        drop(rx_a);
        registry
            .broadcast(conversation, Message::Text("again".into()))
            .await;
        assert_eq!(registry.room_size(conversation).await, 1);
        assert!(matches!(rx_b.recv().await, Some(Message::Text(t)) if t == "again"));
    }

    #[tokio::test]
    async fn rejoin_replaces_stale_entry() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (tx_old, _rx_old) = unbounded_channel();
        let (tx_new, mut rx_new) = unbounded_channel();
        registry.join(conversation, conn, user, tx_old).await;
        registry.join(conversation, conn, user, tx_new).await;
        assert_eq!(registry.room_size(conversation).await, 1);

        registry
            .broadcast(conversation, Message::Text("x".into()))
            .await;
        assert!(rx_new.recv().await.is_some());
    }

    #[tokio::test]
    async fn leave_all_drops_membership_across_rooms() {
        let registry = RoomRegistry::new();
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let conn = Uuid::new_v4();
        let user = Uuid::new_v4();
        let (tx, _rx) = unbounded_channel();

        registry.join(room_a, conn, user, tx.clone()).await;
        registry.join(room_b, conn, user, tx).await;
        registry.leave_all(conn).await;
        assert_eq!(registry.room_size(room_a).await, 0);
        assert_eq!(registry.room_size(room_b).await, 0);
    }
}
