use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed placeholder substituted for a soft-deleted message's content.
pub const DELETED_TOMBSTONE: &str = "This message was deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    Audio,
    System,
    Offer,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::Audio => "audio",
            MessageKind::System => "system",
            MessageKind::Offer => "offer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            "audio" => Some(MessageKind::Audio),
            "system" => Some(MessageKind::System),
            "offer" => Some(MessageKind::Offer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Deleted,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "deleted" => Some(MessageStatus::Deleted),
            _ => None,
        }
    }
}

/// Structured metadata, tagged by message kind.
///
/// Text and image messages carry no extra payload; offer messages carry the
/// back-link to their offer row; file/audio messages carry the display
/// metadata copied from the referenced attachment at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageMeta {
    Text,
    System {
        event: String,
    },
    Offer {
        offer_id: Uuid,
    },
    Attachment {
        file_id: Uuid,
        url: String,
        name: String,
        mimetype: String,
        size: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        thumbnail_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
}

impl Default for MessageMeta {
    fn default() -> Self {
        MessageMeta::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_text_serializes_to_bare_tag() {
        let json = serde_json::to_value(&MessageMeta::Text).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "text"}));
    }

    #[test]
    fn meta_offer_round_trips() {
        let offer_id = Uuid::new_v4();
        let meta = MessageMeta::Offer { offer_id };
        let json = serde_json::to_string(&meta).unwrap();
        let back: MessageMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn meta_attachment_omits_absent_optionals() {
        let meta = MessageMeta::Attachment {
            file_id: Uuid::new_v4(),
            url: "https://cdn.example.com/f.pdf".into(),
            name: "f.pdf".into(),
            mimetype: "application/pdf".into(),
            size: 1024,
            thumbnail_url: None,
            duration_ms: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("thumbnail_url").is_none());
        assert!(json.get("duration_ms").is_none());
    }
}
