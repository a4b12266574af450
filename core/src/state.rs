use serde::{Deserialize, Serialize};

/// Full read model snapshot handed to the presentation layer.
///
/// Every mutation bumps `rev`, so listeners can assume updates arrive in
/// order and drop anything older than what they already rendered.
#[derive(Clone, Debug, Serialize)]
pub struct AppState {
    pub rev: u64,
    pub connection: ConnectionStatus,
    pub busy: BusyState,
    pub conversations: Vec<ConversationSummary>,
    pub active_conversation: Option<ConversationViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionStatus::Disconnected,
            busy: BusyState::idle(),
            conversations: vec![],
            active_conversation: None,
            toast: None,
        }
    }

    pub fn active_conversation_id(&self) -> Option<&str> {
        self.active_conversation
            .as_ref()
            .map(|view| view.conversation_id.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// "In flight" flags for operations the UI should reflect.
///
/// `switching` is true from the moment a conversation is selected until its
/// message page fetch resolves or fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BusyState {
    pub switching: bool,
    pub starting_conversation: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            switching: false,
            starting_conversation: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub presence: PresenceStatus,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    #[default]
    #[serde(other)]
    Offline,
}

/// Last-message summary shown in the conversation list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub id: String,
    pub content: String,
    pub created_at: i64,
    pub sender_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub participants: Vec<Participant>,
    pub last_message: Option<MessageSummary>,
    pub unread_count: u32,
    pub updated_at: i64,
    pub typing_user_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    pub typing_user_ids: Vec<String>,
    pub can_load_older: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: i64,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MessageDeliveryState {
    Pending,
    Sent,
    Failed { reason: String },
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
