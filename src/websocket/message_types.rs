use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::routes::messages::{CreateMessageRequest, MessageDto};
use crate::routes::offers::OfferDto;

/// Events a connected client may emit.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsInboundEvent {
    JoinConversation {
        conversation_id: Uuid,
    },
    SendMessage {
        #[serde(flatten)]
        payload: CreateMessageRequest,
    },
    MarkAsRead {
        conversation_id: Uuid,
    },
}

/// Events the gateway emits to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutboundEvent {
    NewMessage {
        message: MessageDto,
    },
    /// Read-cursor advance, scoped per caller so other participants can
    /// reflect delivery state.
    MessageRead {
        conversation_id: Uuid,
        user_id: Uuid,
        last_read_at: DateTime<Utc>,
    },
    OfferUpdated {
        conversation_id: Uuid,
        offer: OfferDto,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageKind;

    #[test]
    fn inbound_join_parses_camel_case_tag() {
        let raw = format!(
            r#"{{"type":"joinConversation","conversation_id":"{}"}}"#,
            Uuid::new_v4()
        );
        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        assert!(matches!(evt, WsInboundEvent::JoinConversation { .. }));
    }

    #[test]
    fn inbound_send_message_flattens_payload() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"sendMessage","conversation_id":"{conversation_id}","content":"hello"}}"#
        );
        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        match evt {
            WsInboundEvent::SendMessage { payload } => {
                assert_eq!(payload.conversation_id, conversation_id);
                assert_eq!(payload.content, "hello");
                assert_eq!(payload.kind, MessageKind::Text);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn outbound_error_is_tagged() {
        let json = serde_json::to_value(WsOutboundEvent::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }
}
