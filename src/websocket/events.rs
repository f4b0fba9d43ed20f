use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::websocket::message_types::WsOutboundEvent;
use crate::websocket::RoomRegistry;

/// Serializes an outbound event and fans it out to every connection in the
/// room. Fan-out is post-commit and best-effort; serialization failure is
/// logged, never surfaced.
pub async fn broadcast_event(
    registry: &RoomRegistry,
    conversation_id: Uuid,
    event: &WsOutboundEvent,
) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            registry
                .broadcast(conversation_id, Message::Text(payload))
                .await;
        }
        Err(e) => {
            tracing::error!(%conversation_id, error = %e, "failed to serialize outbound event");
        }
    }
}

/// Fan-out that guarantees the caller an echo: when the caller's connection
/// never joined the room, the event is also sent down their own channel so
/// a send/mark-read confirmation is never silently dropped.
pub async fn broadcast_with_echo(
    registry: &RoomRegistry,
    conversation_id: Uuid,
    connection_id: Uuid,
    tx: &UnboundedSender<Message>,
    event: &WsOutboundEvent,
) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            if !registry.is_member(conversation_id, connection_id).await {
                let _ = tx.send(Message::Text(payload.clone()));
            }
            registry
                .broadcast(conversation_id, Message::Text(payload))
                .await;
        }
        Err(e) => {
            tracing::error!(%conversation_id, error = %e, "failed to serialize outbound event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn echo_reaches_sender_outside_room() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();
        let (peer_tx, mut peer_rx) = unbounded_channel();
        registry
            .join(conversation, Uuid::new_v4(), Uuid::new_v4(), peer_tx)
            .await;

        let (sender_tx, mut sender_rx) = unbounded_channel();
        let event = WsOutboundEvent::Error {
            message: "ping".into(),
        };
        broadcast_with_echo(&registry, conversation, Uuid::new_v4(), &sender_tx, &event).await;

        assert!(peer_rx.recv().await.is_some());
        assert!(
            sender_rx.try_recv().is_ok(),
            "sender outside the room still gets the echo"
        );
    }

    #[tokio::test]
    async fn joined_sender_gets_a_single_copy() {
        let registry = RoomRegistry::new();
        let conversation = Uuid::new_v4();
        let connection = Uuid::new_v4();
        let (tx, mut rx) = unbounded_channel();
        registry
            .join(conversation, connection, Uuid::new_v4(), tx.clone())
            .await;

        let event = WsOutboundEvent::Error {
            message: "pong".into(),
        };
        broadcast_with_echo(&registry, conversation, connection, &tx, &event).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "no duplicate echo for room members");
    }
}
