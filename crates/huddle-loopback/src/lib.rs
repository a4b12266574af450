//! In-process doubles for the engine's two boundaries: a loopback transport
//! that tests and demos push server events through, and a loopback backend
//! with scriptable failures and holds. No sockets involved; everything runs
//! in the caller's process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flume::{Receiver, Sender};
use tokio::sync::Notify;

use huddle_core::bus::{decode_intent, encode_event};
use huddle_core::state::now_ms;
use huddle_core::{
    BackendError, BusEvent, BusIntent, ChatBackend, ConversationRecord, EventTransport,
    MessageKind, MessageQuery, MessageRecord, Participant, PresenceStatus, TransportEvent,
    WireFrame,
};

/// Transport double. The test side pushes [`TransportEvent`]s in; everything
/// the engine writes is captured for assertion.
pub struct LoopbackTransport {
    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,
    sent: Mutex<Vec<WireFrame>>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = flume::unbounded();
        Arc::new(Self {
            events_tx,
            events_rx,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn connect(&self) {
        let _ = self.events_tx.send(TransportEvent::Connected);
    }

    pub fn disconnect(&self) {
        let _ = self.events_tx.send(TransportEvent::Disconnected);
    }

    /// Delivers a server-side event to the engine. Lifecycle events map to
    /// the connection signals, everything else becomes a wire frame.
    pub fn push_event(&self, event: &BusEvent) {
        match encode_event(event) {
            Some(frame) => self.push_frame(frame),
            None => match event {
                BusEvent::Connected => self.connect(),
                BusEvent::Disconnected => self.disconnect(),
                _ => {}
            },
        }
    }

    /// Delivers a raw frame, for exercising unknown or malformed traffic.
    pub fn push_frame(&self, frame: WireFrame) {
        let _ = self.events_tx.send(TransportEvent::Frame(frame));
    }

    /// Everything the engine wrote to the wire so far, decoded. Frames that
    /// are not intents are skipped.
    pub fn sent_intents(&self) -> Vec<BusIntent> {
        self.sent
            .lock()
            .expect("sent frames lock")
            .iter()
            .filter_map(decode_intent)
            .collect()
    }

    pub fn sent_frames(&self) -> Vec<WireFrame> {
        self.sent.lock().expect("sent frames lock").clone()
    }
}

impl EventTransport for LoopbackTransport {
    fn incoming(&self) -> Receiver<TransportEvent> {
        self.events_rx.clone()
    }

    fn send(&self, frame: WireFrame) {
        self.sent.lock().expect("sent frames lock").push(frame);
    }
}

#[derive(Default)]
struct ServerState {
    conversations: Vec<ConversationRecord>,
    messages: HashMap<String, Vec<MessageRecord>>,
}

/// Backend double backed by an in-memory server model.
///
/// Failures and holds are per-instance switches so a test can flip behavior
/// mid-flow: `fail_sends` rejects sends, `fail_lists` rejects reads, and
/// `hold_messages` parks message fetches for one conversation until released.
pub struct LoopbackBackend {
    local_user_id: String,
    state: Mutex<ServerState>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
    fail_lists: AtomicBool,
    holds: Mutex<HashMap<String, Arc<Notify>>>,
}

impl LoopbackBackend {
    pub fn new(local_user_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            local_user_id: local_user_id.into(),
            state: Mutex::new(ServerState::default()),
            next_id: AtomicU64::new(1),
            fail_sends: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            holds: Mutex::new(HashMap::new()),
        })
    }

    fn server(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().expect("server state lock")
    }

    fn next_server_id(&self) -> String {
        format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Seeds a conversation and its backlog into the server model.
    pub fn seed_conversation(&self, record: ConversationRecord, backlog: Vec<MessageRecord>) {
        let mut server = self.server();
        let id = record.id.clone();
        server.conversations.retain(|c| c.id != id);
        server.conversations.push(record);
        server.messages.insert(id, backlog);
    }

    /// Appends a message server-side and keeps the conversation summary in
    /// step, exactly as a real server would before broadcasting the event.
    pub fn insert_message(&self, record: MessageRecord) {
        let mut server = self.server();
        if let Some(c) = server
            .conversations
            .iter_mut()
            .find(|c| c.id == record.conversation_id)
        {
            c.last_message = Some((&record).into());
            c.updated_at = record.created_at;
        }
        server
            .messages
            .entry(record.conversation_id.clone())
            .or_default()
            .push(record);
    }

    /// Fabricates a counterparty message, stores it server-side and returns
    /// the record for pushing through a transport.
    pub fn deliver(&self, conversation_id: &str, sender_id: &str, content: &str) -> MessageRecord {
        let record = MessageRecord {
            id: self.next_server_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
            created_at: now_ms(),
        };
        self.insert_message(record.clone());
        record
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Parks every message fetch for `conversation_id` until
    /// [`LoopbackBackend::release_messages`] runs.
    pub fn hold_messages(&self, conversation_id: &str) {
        self.holds
            .lock()
            .expect("holds lock")
            .insert(conversation_id.to_string(), Arc::new(Notify::new()));
    }

    pub fn release_messages(&self, conversation_id: &str) {
        if let Some(gate) = self.holds.lock().expect("holds lock").remove(conversation_id) {
            gate.notify_one();
        }
    }

    async fn wait_if_held(&self, conversation_id: &str) {
        loop {
            let gate = self
                .holds
                .lock()
                .expect("holds lock")
                .get(conversation_id)
                .cloned();
            match gate {
                None => return,
                Some(gate) => gate.notified().await,
            }
        }
    }
}

#[async_trait]
impl ChatBackend for LoopbackBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, BackendError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(BackendError("list unavailable".to_string()));
        }
        Ok(self.server().conversations.clone())
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>, BackendError> {
        self.wait_if_held(conversation_id).await;
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(BackendError("list unavailable".to_string()));
        }
        let server = self.server();
        let Some(all) = server.messages.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let mut page: Vec<MessageRecord> = all.clone();
        page.sort_by_key(|m| m.created_at);
        let end = match &query.before_id {
            Some(id) => page.iter().position(|m| m.id == *id).unwrap_or(page.len()),
            None => page.len(),
        };
        let start = end.saturating_sub(query.limit as usize);
        Ok(page[start..end].to_vec())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRecord, BackendError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            tracing::debug!(%conversation_id, "rejecting send");
            return Err(BackendError("send rejected".to_string()));
        }
        let record = MessageRecord {
            id: self.next_server_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: self.local_user_id.clone(),
            content: content.to_string(),
            kind,
            created_at: now_ms(),
        };
        self.insert_message(record.clone());
        Ok(record)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<(), BackendError> {
        let mut server = self.server();
        if let Some(c) = server
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.unread_count = 0;
        }
        Ok(())
    }

    async fn start_conversation(
        &self,
        user_id: &str,
    ) -> Result<ConversationRecord, BackendError> {
        let mut server = self.server();
        if let Some(existing) = server
            .conversations
            .iter()
            .find(|c| c.participants.iter().any(|p| p.user_id == user_id))
        {
            return Ok(existing.clone());
        }
        let record = ConversationRecord {
            id: format!("dm-{user_id}"),
            participants: vec![participant(&self.local_user_id), participant(user_id)],
            last_message: None,
            unread_count: 0,
            updated_at: now_ms(),
        };
        server.conversations.push(record.clone());
        server.messages.insert(record.id.clone(), Vec::new());
        Ok(record)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        let mut server = self.server();
        server.conversations.retain(|c| c.id != conversation_id);
        server.messages.remove(conversation_id);
        Ok(())
    }
}

/// Minimal participant for seeded fixtures.
pub fn participant(user_id: &str) -> Participant {
    Participant {
        user_id: user_id.to_string(),
        display_name: user_id.to_string(),
        avatar_ref: None,
        presence: PresenceStatus::Offline,
    }
}

/// Conversation record with no backlog summary.
pub fn conversation_record(id: &str, peer_id: &str, updated_at: i64) -> ConversationRecord {
    ConversationRecord {
        id: id.to_string(),
        participants: vec![participant(peer_id)],
        last_message: None,
        unread_count: 0,
        updated_at,
    }
}

/// Message record with explicit timestamp, for deterministic backlogs.
pub fn message_record(
    id: &str,
    conversation_id: &str,
    sender_id: &str,
    content: &str,
    created_at: i64,
) -> MessageRecord {
    MessageRecord {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: content.to_string(),
        kind: MessageKind::Text,
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_pages_respect_limit_and_before_id() {
        let backend = LoopbackBackend::new("me");
        backend.seed_conversation(
            conversation_record("c1", "u2", 50),
            vec![
                message_record("m1", "c1", "u2", "one", 10),
                message_record("m2", "c1", "u2", "two", 20),
                message_record("m3", "c1", "u2", "three", 30),
                message_record("m4", "c1", "u2", "four", 40),
            ],
        );

        let latest = backend
            .list_messages("c1", MessageQuery::latest(2))
            .await
            .unwrap();
        assert_eq!(
            latest.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            ["m3", "m4"]
        );

        let older = backend
            .list_messages("c1", MessageQuery::before("m3", 2))
            .await
            .unwrap();
        assert_eq!(
            older.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            ["m1", "m2"]
        );
    }

    #[tokio::test]
    async fn held_fetch_parks_until_released() {
        let backend = LoopbackBackend::new("me");
        backend.seed_conversation(conversation_record("c1", "u2", 50), Vec::new());
        backend.hold_messages("c1");

        let fetcher = backend.clone();
        let handle = tokio::spawn(async move {
            fetcher.list_messages("c1", MessageQuery::latest(10)).await
        });

        assert!(!handle.is_finished());
        backend.release_messages("c1");
        let result = handle.await.unwrap();
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_failure_switch_is_reversible() {
        let backend = LoopbackBackend::new("me");
        backend.seed_conversation(conversation_record("c1", "u2", 50), Vec::new());
        backend.fail_sends(true);
        assert!(backend
            .send_message("c1", "hello", MessageKind::Text)
            .await
            .is_err());
        backend.fail_sends(false);
        let record = backend
            .send_message("c1", "hello", MessageKind::Text)
            .await
            .unwrap();
        assert_eq!(record.sender_id, "me");
        assert!(record.id.starts_with("srv-"));
    }

    #[test]
    fn transport_captures_and_decodes_intents() {
        let transport = LoopbackTransport::new();
        transport.send(huddle_core::bus::encode_intent(
            &BusIntent::JoinConversation {
                conversation_id: "c1".to_string(),
            },
        ));
        assert_eq!(
            transport.sent_intents(),
            vec![BusIntent::JoinConversation {
                conversation_id: "c1".to_string()
            }]
        );
    }
}
