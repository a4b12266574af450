use std::sync::Arc;

use flume::Receiver;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::MessageRecord;

pub const EVENT_MESSAGE_CREATED: &str = "message:created";
pub const EVENT_TYPING_CHANGED: &str = "typing:changed";
pub const EVENT_CONVERSATION_REMOVED: &str = "conversation:removed";

pub const INTENT_JOIN_CONVERSATION: &str = "conversation:join";
pub const INTENT_LEAVE_CONVERSATION: &str = "conversation:leave";
pub const INTENT_SEND_TYPING: &str = "typing:set";

/// One frame on the persistent connection: event name plus JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    pub data: serde_json::Value,
}

/// What the transport client delivers: connection lifecycle plus raw frames.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Frame(WireFrame),
}

/// The persistent-connection client. Implementations own connecting,
/// reconnecting and frame delivery; the engine only consumes `incoming`
/// and pushes frames through `send`. `send` must never block.
pub trait EventTransport: Send + Sync + 'static {
    fn incoming(&self) -> Receiver<TransportEvent>;
    fn send(&self, frame: WireFrame);
}

/// Inbound push events, normalized from raw frames.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    Connected,
    Disconnected,
    MessageCreated {
        conversation_id: String,
        message: MessageRecord,
    },
    TypingChanged {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    ConversationRemoved {
        conversation_id: String,
    },
}

/// Outbound intents the engine emits over the persistent connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusIntent {
    JoinConversation { conversation_id: String },
    LeaveConversation { conversation_id: String },
    SendTyping {
        conversation_id: String,
        is_typing: bool,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageCreatedPayload {
    conversation_id: String,
    message: MessageRecord,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingChangedPayload {
    conversation_id: String,
    user_id: String,
    is_typing: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationPayload {
    conversation_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTypingPayload {
    conversation_id: String,
    is_typing: bool,
}

/// Wraps the transport client: decodes inbound frames into [`BusEvent`]s and
/// encodes outbound [`BusIntent`]s. Stateless apart from the client handle.
pub struct EventBusAdapter {
    transport: Arc<dyn EventTransport>,
}

impl EventBusAdapter {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }

    pub fn incoming(&self) -> Receiver<TransportEvent> {
        self.transport.incoming()
    }

    pub fn emit(&self, intent: BusIntent) {
        self.transport.send(encode_intent(&intent));
    }

    /// Normalizes one transport event. Unrecognized or undecodable frames
    /// are dropped with a debug log; the stream itself is never failed.
    pub fn normalize(event: TransportEvent) -> Option<BusEvent> {
        match event {
            TransportEvent::Connected => Some(BusEvent::Connected),
            TransportEvent::Disconnected => Some(BusEvent::Disconnected),
            TransportEvent::Frame(frame) => decode_event(frame),
        }
    }
}

pub fn decode_event(frame: WireFrame) -> Option<BusEvent> {
    match frame.event.as_str() {
        EVENT_MESSAGE_CREATED => match serde_json::from_value::<MessageCreatedPayload>(frame.data)
        {
            Ok(p) => Some(BusEvent::MessageCreated {
                conversation_id: p.conversation_id,
                message: p.message,
            }),
            Err(err) => {
                debug!(event = EVENT_MESSAGE_CREATED, %err, "dropping undecodable frame");
                None
            }
        },
        EVENT_TYPING_CHANGED => match serde_json::from_value::<TypingChangedPayload>(frame.data) {
            Ok(p) => Some(BusEvent::TypingChanged {
                conversation_id: p.conversation_id,
                user_id: p.user_id,
                is_typing: p.is_typing,
            }),
            Err(err) => {
                debug!(event = EVENT_TYPING_CHANGED, %err, "dropping undecodable frame");
                None
            }
        },
        EVENT_CONVERSATION_REMOVED => {
            match serde_json::from_value::<ConversationPayload>(frame.data) {
                Ok(p) => Some(BusEvent::ConversationRemoved {
                    conversation_id: p.conversation_id,
                }),
                Err(err) => {
                    debug!(event = EVENT_CONVERSATION_REMOVED, %err, "dropping undecodable frame");
                    None
                }
            }
        }
        other => {
            debug!(event = other, "dropping unrecognized frame");
            None
        }
    }
}

/// Inverse of [`decode_event`], used by transports that fabricate inbound
/// traffic. Lifecycle signals are not frames, hence the `Option`.
pub fn encode_event(event: &BusEvent) -> Option<WireFrame> {
    let (name, data) = match event {
        BusEvent::Connected | BusEvent::Disconnected => return None,
        BusEvent::MessageCreated {
            conversation_id,
            message,
        } => (
            EVENT_MESSAGE_CREATED,
            serde_json::to_value(MessageCreatedPayload {
                conversation_id: conversation_id.clone(),
                message: message.clone(),
            }),
        ),
        BusEvent::TypingChanged {
            conversation_id,
            user_id,
            is_typing,
        } => (
            EVENT_TYPING_CHANGED,
            serde_json::to_value(TypingChangedPayload {
                conversation_id: conversation_id.clone(),
                user_id: user_id.clone(),
                is_typing: *is_typing,
            }),
        ),
        BusEvent::ConversationRemoved { conversation_id } => (
            EVENT_CONVERSATION_REMOVED,
            serde_json::to_value(ConversationPayload {
                conversation_id: conversation_id.clone(),
            }),
        ),
    };
    Some(WireFrame {
        event: name.to_string(),
        data: data.unwrap_or_default(),
    })
}

pub fn encode_intent(intent: &BusIntent) -> WireFrame {
    let (name, data) = match intent {
        BusIntent::JoinConversation { conversation_id } => (
            INTENT_JOIN_CONVERSATION,
            serde_json::to_value(ConversationPayload {
                conversation_id: conversation_id.clone(),
            }),
        ),
        BusIntent::LeaveConversation { conversation_id } => (
            INTENT_LEAVE_CONVERSATION,
            serde_json::to_value(ConversationPayload {
                conversation_id: conversation_id.clone(),
            }),
        ),
        BusIntent::SendTyping {
            conversation_id,
            is_typing,
        } => (
            INTENT_SEND_TYPING,
            serde_json::to_value(SendTypingPayload {
                conversation_id: conversation_id.clone(),
                is_typing: *is_typing,
            }),
        ),
    };
    WireFrame {
        event: name.to_string(),
        data: data.unwrap_or_default(),
    }
}

/// Inverse of [`encode_intent`], for transports that assert on outbound
/// traffic.
pub fn decode_intent(frame: &WireFrame) -> Option<BusIntent> {
    match frame.event.as_str() {
        INTENT_JOIN_CONVERSATION => {
            serde_json::from_value::<ConversationPayload>(frame.data.clone())
                .ok()
                .map(|p| BusIntent::JoinConversation {
                    conversation_id: p.conversation_id,
                })
        }
        INTENT_LEAVE_CONVERSATION => {
            serde_json::from_value::<ConversationPayload>(frame.data.clone())
                .ok()
                .map(|p| BusIntent::LeaveConversation {
                    conversation_id: p.conversation_id,
                })
        }
        INTENT_SEND_TYPING => serde_json::from_value::<SendTypingPayload>(frame.data.clone())
            .ok()
            .map(|p| BusIntent::SendTyping {
                conversation_id: p.conversation_id,
                is_typing: p.is_typing,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_message_created_frame() {
        let frame = WireFrame {
            event: EVENT_MESSAGE_CREATED.to_string(),
            data: json!({
                "conversationId": "c1",
                "message": {
                    "id": "m1",
                    "conversationId": "c1",
                    "senderId": "u2",
                    "content": "hello",
                    "type": "text",
                    "createdAt": 1_000
                }
            }),
        };
        match decode_event(frame) {
            Some(BusEvent::MessageCreated {
                conversation_id,
                message,
            }) => {
                assert_eq!(conversation_id, "c1");
                assert_eq!(message.id, "m1");
                assert_eq!(message.created_at, 1_000);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_is_dropped() {
        let frame = WireFrame {
            event: "presence:ping".to_string(),
            data: json!({}),
        };
        assert_eq!(decode_event(frame), None);
    }

    #[test]
    fn undecodable_payload_is_dropped() {
        let frame = WireFrame {
            event: EVENT_TYPING_CHANGED.to_string(),
            data: json!({ "conversationId": 42 }),
        };
        assert_eq!(decode_event(frame), None);
    }

    #[test]
    fn intents_round_trip_through_frames() {
        let intents = [
            BusIntent::JoinConversation {
                conversation_id: "c1".to_string(),
            },
            BusIntent::LeaveConversation {
                conversation_id: "c1".to_string(),
            },
            BusIntent::SendTyping {
                conversation_id: "c1".to_string(),
                is_typing: true,
            },
        ];
        for intent in intents {
            let frame = encode_intent(&intent);
            assert_eq!(decode_intent(&frame), Some(intent));
        }
    }

    #[test]
    fn message_kind_defaults_to_text_and_tolerates_unknown() {
        let frame = WireFrame {
            event: EVENT_MESSAGE_CREATED.to_string(),
            data: json!({
                "conversationId": "c1",
                "message": {
                    "id": "m1",
                    "conversationId": "c1",
                    "senderId": "u2",
                    "content": "gif",
                    "type": "sticker",
                    "createdAt": 5
                }
            }),
        };
        match decode_event(frame) {
            Some(BusEvent::MessageCreated { message, .. }) => {
                assert_eq!(message.kind, crate::state::MessageKind::Other);
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }
}
