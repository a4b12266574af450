use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{MessageKind, MessageSummary, Participant};

/// Failure from the data-access layer. The engine treats every backend
/// failure as transient and retry eligible.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("request failed: {0}")]
pub struct BackendError(pub String);

/// Conversation summary as served by the data-access layer.
///
/// `unread_count` is the server's idea of the counter. The engine only
/// trusts it when a conversation is first seen; after that the locally
/// maintained counter wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<MessageSummary>,
    #[serde(default)]
    pub unread_count: u32,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    pub created_at: i64,
}

impl From<&MessageRecord> for MessageSummary {
    fn from(record: &MessageRecord) -> Self {
        MessageSummary {
            id: record.id.clone(),
            content: record.content.clone(),
            created_at: record.created_at,
            sender_id: record.sender_id.clone(),
        }
    }
}

/// Paging parameters for message reads. `before_id` pages backwards from an
/// already-held message; `None` asks for the latest page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub limit: u32,
    pub before_id: Option<String>,
}

impl MessageQuery {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            before_id: None,
        }
    }

    pub fn before(message_id: impl Into<String>, limit: u32) -> Self {
        Self {
            limit,
            before_id: Some(message_id.into()),
        }
    }
}

/// The request/response data-access layer.
///
/// All operations are idempotent from the engine's point of view; results
/// are merged through the stores, never applied blindly.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, BackendError>;

    /// Messages in ascending `created_at` order, at most `query.limit` of
    /// them, all strictly older than `query.before_id` when that is set.
    async fn list_messages(
        &self,
        conversation_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>, BackendError>;

    /// Returns the confirmed message with its server-assigned id.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRecord, BackendError>;

    async fn mark_read(&self, conversation_id: &str) -> Result<(), BackendError>;

    async fn start_conversation(&self, user_id: &str)
        -> Result<ConversationRecord, BackendError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError>;
}
