use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::{
    BulkMessage, Conversation, ConversationPatch, Message, canonical_ids, promote_id,
};
use crate::error::ApiResult;

/// Channels the server pushes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    NewConversation,
    ConversationUpdated,
    BulkMessageCreated,
    BulkMessageUpdated,
    TypingStart,
    TypingStop,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::NewMessage,
        EventKind::NewConversation,
        EventKind::ConversationUpdated,
        EventKind::BulkMessageCreated,
        EventKind::BulkMessageUpdated,
        EventKind::TypingStart,
        EventKind::TypingStop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "newMessage",
            EventKind::NewConversation => "newConversation",
            EventKind::ConversationUpdated => "conversationUpdated",
            EventKind::BulkMessageCreated => "bulkMessageCreated",
            EventKind::BulkMessageUpdated => "bulkMessageUpdated",
            EventKind::TypingStart => "typing:start",
            EventKind::TypingStop => "typing:stop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewMessage(Message),
    NewConversation(Conversation),
    ConversationUpdated(ConversationPatch),
    BulkMessageCreated(BulkMessage),
    BulkMessageUpdated(BulkMessage),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
}

impl ServerEvent {
    /// Decodes a pushed event. `Ok(None)` for channels this client doesn't handle.
    pub fn decode(name: &str, mut data: Value) -> ApiResult<Option<Self>> {
        let Some(kind) = EventKind::from_name(name) else {
            return Ok(None);
        };
        canonical_ids(&mut data);
        let event = match kind {
            EventKind::NewMessage => ServerEvent::NewMessage(serde_json::from_value(data)?),
            EventKind::NewConversation => {
                ServerEvent::NewConversation(serde_json::from_value(data)?)
            }
            EventKind::ConversationUpdated => {
                promote_id(&mut data, "conversationId");
                ServerEvent::ConversationUpdated(serde_json::from_value(data)?)
            }
            EventKind::BulkMessageCreated => {
                ServerEvent::BulkMessageCreated(serde_json::from_value(data)?)
            }
            EventKind::BulkMessageUpdated => {
                ServerEvent::BulkMessageUpdated(serde_json::from_value(data)?)
            }
            EventKind::TypingStart => ServerEvent::TypingStart(serde_json::from_value(data)?),
            EventKind::TypingStop => ServerEvent::TypingStop(serde_json::from_value(data)?),
        };
        Ok(Some(event))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::NewConversation(_) => EventKind::NewConversation,
            ServerEvent::ConversationUpdated(_) => EventKind::ConversationUpdated,
            ServerEvent::BulkMessageCreated(_) => EventKind::BulkMessageCreated,
            ServerEvent::BulkMessageUpdated(_) => EventKind::BulkMessageUpdated,
            ServerEvent::TypingStart(_) => EventKind::TypingStart,
            ServerEvent::TypingStop(_) => EventKind::TypingStop,
        }
    }
}

/// Room and typing notifications the client emits.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinConversation(String),
    LeaveConversation(String),
    TypingStart(String),
    TypingStop(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinConversation(_) => "joinConversation",
            ClientEvent::LeaveConversation(_) => "leaveConversation",
            ClientEvent::TypingStart(_) => "typing:start",
            ClientEvent::TypingStop(_) => "typing:stop",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::JoinConversation(id) | ClientEvent::LeaveConversation(id) => {
                Value::String(id.clone())
            }
            ClientEvent::TypingStart(id) | ClientEvent::TypingStop(id) => {
                serde_json::json!({ "conversationId": id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("reviewCreated"), None);
    }

    #[test]
    fn decodes_typed_payloads() {
        let ev = ServerEvent::decode(
            "conversationUpdated",
            json!({ "_id": "c1", "status": "resolved" }),
        )
        .unwrap()
        .unwrap();
        match ev {
            ServerEvent::ConversationUpdated(p) => {
                assert_eq!(p.id, "c1");
                assert_eq!(p.status.as_deref(), Some("resolved"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn update_with_every_id_spelling_decodes() {
        let ev = ServerEvent::decode(
            "conversationUpdated",
            json!({ "_id": "c1", "conversationId": "c1", "id": "c1", "status": "pending" }),
        )
        .unwrap()
        .unwrap();
        let ServerEvent::ConversationUpdated(p) = ev else {
            panic!("unexpected {ev:?}");
        };
        assert_eq!(p.id, "c1");
        assert_eq!(p.status.as_deref(), Some("pending"));

        let ev = ServerEvent::decode("conversationUpdated", json!({ "conversationId": "c2", "unread": false }))
            .unwrap()
            .unwrap();
        assert!(matches!(ev, ServerEvent::ConversationUpdated(ref p) if p.id == "c2"));
    }

    #[test]
    fn new_message_keeps_parent_id() {
        let ev = ServerEvent::decode(
            "newMessage",
            json!({ "_id": "m1", "id": "m1", "conversationId": "c1", "content": "hi" }),
        )
        .unwrap()
        .unwrap();
        let ServerEvent::NewMessage(m) = ev else {
            panic!("unexpected {ev:?}");
        };
        assert_eq!((m.id.as_str(), m.conversation_id.as_str()), ("m1", "c1"));
    }

    #[test]
    fn unknown_channels_are_ignored() {
        assert_eq!(ServerEvent::decode("somethingElse", json!({})).unwrap(), None);
    }

    #[test]
    fn bad_payload_is_an_error() {
        assert!(ServerEvent::decode("newMessage", json!({ "content": "no ids" })).is_err());
    }

    #[test]
    fn typing_emits_object_payload() {
        assert_eq!(
            ClientEvent::TypingStart("c1".into()).payload(),
            json!({ "conversationId": "c1" })
        );
        assert_eq!(ClientEvent::JoinConversation("c1".into()).payload(), json!("c1"));
    }
}
