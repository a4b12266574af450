use crate::state::MessageKind;

#[derive(Debug, Clone)]
pub enum AppAction {
    // Conversation list
    SelectConversation {
        conversation_id: String,
    },
    CloseConversation,
    StartConversation {
        user_id: String,
    },
    DeleteConversation {
        conversation_id: String,
    },
    RefreshConversations,

    // Messages
    SendMessage {
        conversation_id: String,
        content: String,
        kind: MessageKind,
    },
    RetryMessage {
        conversation_id: String,
        message_id: String,
    },
    LoadOlderMessages {
        conversation_id: String,
        before_message_id: String,
        limit: u32,
    },

    // Composer
    Composing {
        conversation_id: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    Foregrounded,
    Backgrounded,
}

impl AppAction {
    /// Log-safe action tag (never includes message content).
    pub fn tag(&self) -> &'static str {
        match self {
            // Conversation list
            AppAction::SelectConversation { .. } => "SelectConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::StartConversation { .. } => "StartConversation",
            AppAction::DeleteConversation { .. } => "DeleteConversation",
            AppAction::RefreshConversations => "RefreshConversations",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",

            // Composer
            AppAction::Composing { .. } => "Composing",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::Foregrounded => "Foregrounded",
            AppAction::Backgrounded => "Backgrounded",
        }
    }
}
