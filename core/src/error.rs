use thiserror::Error;

use crate::backend::BackendError;

/// Engine-side classification of failures.
///
/// Only `Network` reaches the user (with a retry path); the other variants
/// are handled internally and at most logged.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A fetch or write against the data-access layer failed. Always retry
    /// eligible: validation happens before a request is issued.
    #[error("network: {0}")]
    Network(#[from] BackendError),

    /// An async result landed after its target conversation stopped being
    /// the active one. Discarded, never applied.
    #[error("stale result for conversation {conversation_id}")]
    StaleResult { conversation_id: String },

    /// A live event referenced a conversation the store has never seen.
    /// Resolved by forcing a full snapshot refresh.
    #[error("unknown conversation {conversation_id}")]
    UnknownConversation { conversation_id: String },

    /// Outgoing message content was empty after trimming. Rejected before
    /// any network call.
    #[error("empty message content")]
    EmptyMessage,
}

impl SyncError {
    /// Whether the user should be offered a retry for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}
