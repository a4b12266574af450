use crate::backend::{BackendError, ConversationRecord, MessageRecord};
use crate::bus::BusEvent;
use crate::state::{AppState, BusyState, ConnectionStatus, ConversationSummary, ConversationViewState};
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    ConnectionChanged {
        rev: u64,
        connection: ConnectionStatus,
    },
    BusyChanged {
        rev: u64,
        busy: BusyState,
    },
    ConversationListChanged {
        rev: u64,
        conversations: Vec<ConversationSummary>,
    },
    ActiveConversationChanged {
        rev: u64,
        active_conversation: Option<ConversationViewState>,
    },
    /// A live message landed in the active conversation; the presentation
    /// layer should scroll its message list to the latest entry.
    ScrollToLatest {
        rev: u64,
        conversation_id: String,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::ConnectionChanged { rev, .. } => *rev,
            AppUpdate::BusyChanged { rev, .. } => *rev,
            AppUpdate::ConversationListChanged { rev, .. } => *rev,
            AppUpdate::ActiveConversationChanged { rev, .. } => *rev,
            AppUpdate::ScrollToLatest { rev, .. } => *rev,
            AppUpdate::ToastChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Push path
    Bus(BusEvent),

    // Async fetch results
    ConversationsFetched {
        result: Result<Vec<ConversationRecord>, BackendError>,
    },
    MessagesFetched {
        conversation_id: String,
        token: u64,
        // Set when this was an older-page fetch; the page lands before it.
        before_id: Option<String>,
        limit: u32,
        result: Result<Vec<MessageRecord>, BackendError>,
    },

    // Async write results
    SendCompleted {
        conversation_id: String,
        local_id: String,
        result: Result<MessageRecord, BackendError>,
    },
    MarkReadCompleted {
        conversation_id: String,
        user_initiated: bool,
        result: Result<(), BackendError>,
    },
    DeleteCompleted {
        conversation_id: String,
        result: Result<(), BackendError>,
    },
    ConversationStarted {
        user_id: String,
        result: Result<ConversationRecord, BackendError>,
    },

    // Timers
    PollTick {
        token: u64,
    },
    TypingIdleTimeout {
        conversation_id: String,
        seq: u64,
    },
    PresenceSweep,
}
