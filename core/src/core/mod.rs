pub mod config;
mod session;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;
use uuid::Uuid;

use crate::actions::AppAction;
use crate::backend::{ChatBackend, MessageRecord};
use crate::bus::{BusEvent, BusIntent, EventBusAdapter, EventTransport};
use crate::error::SyncError;
use crate::state::{
    now_ms, AppState, ChatMessage, ConnectionStatus, ConversationSummary, ConversationViewState,
    MessageDeliveryState, MessageKind, MessageSummary,
};
use crate::store::conversations::{ConversationStore, MessageApplied};
use crate::store::messages::MessageStore;
use crate::store::presence::PresenceTracker;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

#[derive(Debug, Clone)]
struct PendingSend {
    conversation_id: String,
    content: String,
    kind: MessageKind,
}

/// The synchronization coordinator. Owns every store outright and runs on a
/// single actor thread: user actions and completed async work arrive through
/// one queue, so store mutations never race and per-conversation event order
/// is exactly transport arrival order.
pub struct SyncCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    local_user_id: String,
    config: config::EngineConfig,
    runtime: tokio::runtime::Runtime,

    backend: Arc<dyn ChatBackend>,
    bus: EventBusAdapter,

    conversations: ConversationStore,
    messages: MessageStore,
    presence: PresenceTracker,

    // Stale-result guards. A message-page fetch is only applied when its
    // token still matches; switching away bumps the token and thereby
    // discards anything in flight.
    fetch_token: u64,
    poll_token: u64,
    poll_alive: Option<Arc<AtomicBool>>,

    // Local composer state: at most one conversation carries our typing
    // intent, and only the timer armed by the latest keystroke may stop it.
    composing_in: Option<String>,
    composing_seq: u64,
    sweep_scheduled: bool,

    // Sends kept around so RetryMessage can resubmit the same content.
    pending_sends: HashMap<String, PendingSend>,
    can_load_older: HashMap<String, bool>,
}

impl SyncCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        local_user_id: String,
        config: config::EngineConfig,
        backend: Arc<dyn ChatBackend>,
        transport: Arc<dyn EventTransport>,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let presence = PresenceTracker::new(config.typing_ttl_ms as i64);

        let mut this = Self {
            state: AppState::empty(),
            rev: 0,
            last_outgoing_ts: 0,
            update_sender,
            core_sender,
            shared_state,
            local_user_id,
            config,
            runtime,
            backend,
            bus: EventBusAdapter::new(transport),
            conversations: ConversationStore::new(),
            messages: MessageStore::new(),
            presence,
            fetch_token: 0,
            poll_token: 0,
            poll_alive: None,
            composing_in: None,
            composing_seq: 0,
            sweep_scheduled: false,
            pending_sends: HashMap::new(),
            can_load_older: HashMap::new(),
        };

        // Ensure ChatEngine::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);

        this.start_event_pump();
        this.start_poll_loop();
        this.fetch_conversation_list();
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_full_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_connection(&mut self) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ConnectionChanged {
            rev,
            connection: snapshot.connection,
        });
    }

    fn emit_busy(&mut self) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::BusyChanged {
            rev,
            busy: snapshot.busy,
        });
    }

    fn emit_conversation_list(&mut self) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ConversationListChanged {
            rev,
            conversations: snapshot.conversations,
        });
    }

    fn emit_active_conversation(&mut self) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ActiveConversationChanged {
            rev,
            active_conversation: snapshot.active_conversation,
        });
    }

    fn emit_toast(&mut self) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ToastChanged {
            rev,
            toast: snapshot.toast,
        });
    }

    fn emit_scroll_to_latest(&mut self, conversation_id: &str) {
        // Side-effect update: no state field changes, but it still bumps rev
        // so listeners observe a strictly increasing stream.
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ScrollToLatest {
            rev,
            conversation_id: conversation_id.to_string(),
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a state()
        // resync still sees the notice.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut crate::state::BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_busy();
        }
    }

    fn active_conversation_id(&self) -> Option<String> {
        self.state
            .active_conversation
            .as_ref()
            .map(|v| v.conversation_id.clone())
    }

    fn chat_message_from_record(&self, record: &MessageRecord) -> ChatMessage {
        ChatMessage {
            id: record.id.clone(),
            sender_id: record.sender_id.clone(),
            content: record.content.clone(),
            kind: record.kind,
            created_at: record.created_at,
            is_mine: record.sender_id == self.local_user_id,
            delivery: MessageDeliveryState::Sent,
        }
    }

    /// Rebuild the conversation list slice of the read model and emit it.
    fn refresh_conversation_list(&mut self) {
        let now = now_ms();
        let list: Vec<ConversationSummary> = self
            .conversations
            .ordered()
            .iter()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                participants: c.participants.clone(),
                last_message: c.last_message.clone(),
                unread_count: c.unread_count,
                updated_at: c.updated_at,
                typing_user_ids: self.presence.typing_users(&c.id, now),
            })
            .collect();
        self.state.conversations = list;
        self.emit_conversation_list();
    }

    fn build_view(&self, conversation_id: &str) -> ConversationViewState {
        ConversationViewState {
            conversation_id: conversation_id.to_string(),
            messages: self.messages.messages(conversation_id).to_vec(),
            typing_user_ids: self.presence.typing_users(conversation_id, now_ms()),
            can_load_older: self
                .can_load_older
                .get(conversation_id)
                .copied()
                .unwrap_or(false),
        }
    }

    /// Rebuild the active view slice of the read model and emit it. No-op
    /// when nothing is active.
    fn refresh_active_view(&mut self) {
        let Some(conversation_id) = self.active_conversation_id() else {
            return;
        };
        self.state.active_conversation = Some(self.build_view(&conversation_id));
        self.emit_active_conversation();
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries message content.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::SelectConversation { conversation_id } => {
                self.select_conversation(conversation_id)
            }
            AppAction::CloseConversation => self.close_conversation(),
            AppAction::StartConversation { user_id } => self.start_conversation(user_id),
            AppAction::DeleteConversation { conversation_id } => {
                self.delete_conversation(conversation_id)
            }
            AppAction::RefreshConversations => self.fetch_conversation_list(),
            AppAction::SendMessage {
                conversation_id,
                content,
                kind,
            } => self.send_message(conversation_id, content, kind),
            AppAction::RetryMessage {
                conversation_id,
                message_id,
            } => self.retry_message(conversation_id, message_id),
            AppAction::LoadOlderMessages {
                conversation_id,
                before_message_id,
                limit,
            } => self.load_older_messages(conversation_id, before_message_id, limit),
            AppAction::Composing { conversation_id } => self.composer_activity(conversation_id),
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }
            AppAction::Foregrounded => self.foregrounded(),
            AppAction::Backgrounded => self.backgrounded(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::Bus(event) => self.handle_bus_event(event),
            InternalEvent::ConversationsFetched { result } => match result {
                Ok(records) => {
                    if self.conversations.upsert_from_snapshot(records) {
                        self.refresh_conversation_list();
                    }
                }
                Err(err) => {
                    // Background refresh stays silent; the next tick retries.
                    tracing::debug!(%err, "conversation snapshot failed");
                }
            },
            InternalEvent::MessagesFetched {
                conversation_id,
                token,
                before_id,
                limit,
                result,
            } => self.handle_messages_fetched(conversation_id, token, before_id, limit, result),
            InternalEvent::SendCompleted {
                conversation_id,
                local_id,
                result,
            } => self.handle_send_completed(conversation_id, local_id, result),
            InternalEvent::MarkReadCompleted {
                conversation_id,
                user_initiated,
                result,
            } => {
                if let Err(err) = result {
                    let err = SyncError::Network(err);
                    if user_initiated {
                        tracing::warn!(%conversation_id, %err, "mark-read failed");
                        self.toast("Couldn't mark conversation as read");
                    } else {
                        // Receipt refresh while viewing; the next snapshot
                        // reconciles, a notice per incoming message would be
                        // noise.
                        tracing::debug!(%conversation_id, %err, "read receipt failed");
                    }
                }
            }
            InternalEvent::DeleteCompleted {
                conversation_id,
                result,
            } => match result {
                Ok(()) => tracing::debug!(%conversation_id, "delete confirmed"),
                Err(err) => {
                    let err = SyncError::Network(err);
                    // Optimistic removal stands; a later snapshot reconciles
                    // if the server still has the conversation.
                    tracing::warn!(%conversation_id, %err, "delete failed");
                    self.toast("Couldn't delete conversation on the server");
                }
            },
            InternalEvent::ConversationStarted { user_id, result } => {
                self.set_busy(|b| b.starting_conversation = false);
                match result {
                    Ok(record) => {
                        let conversation_id = record.id.clone();
                        self.conversations.upsert_from_snapshot(vec![record]);
                        self.refresh_conversation_list();
                        self.select_conversation(conversation_id);
                    }
                    Err(err) => {
                        let err = SyncError::Network(err);
                        tracing::warn!(%user_id, %err, "start conversation failed");
                        self.toast(format!("Couldn't start conversation: {err}"));
                    }
                }
            }
            InternalEvent::PollTick { token } => {
                if token != self.poll_token {
                    return;
                }
                self.fetch_conversation_list();
            }
            InternalEvent::TypingIdleTimeout {
                conversation_id,
                seq,
            } => {
                // Only the timer armed by the most recent keystroke counts.
                if seq != self.composing_seq {
                    return;
                }
                if self.composing_in.as_deref() == Some(conversation_id.as_str()) {
                    self.composing_in = None;
                    self.bus.emit(BusIntent::SendTyping {
                        conversation_id,
                        is_typing: false,
                    });
                }
            }
            InternalEvent::PresenceSweep => {
                self.sweep_scheduled = false;
                if self.presence.sweep(now_ms()) {
                    self.refresh_conversation_list();
                    self.refresh_active_view();
                }
                if !self.presence.is_empty() {
                    self.schedule_presence_sweep();
                }
            }
        }
    }

    fn handle_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::Connected => {
                if self.state.connection == ConnectionStatus::Connected {
                    return;
                }
                self.state.connection = ConnectionStatus::Connected;
                self.emit_connection();
                // Events lost while disconnected are unrecoverable; force a
                // full resync of the list and the active page.
                self.fetch_conversation_list();
                if let Some(conversation_id) = self.active_conversation_id() {
                    self.fetch_token = self.fetch_token.wrapping_add(1);
                    let limit = self.config.message_page_size;
                    self.spawn_fetch_messages(conversation_id, self.fetch_token, None, limit);
                }
            }
            BusEvent::Disconnected => {
                if self.state.connection == ConnectionStatus::Disconnected {
                    return;
                }
                self.state.connection = ConnectionStatus::Disconnected;
                self.emit_connection();
            }
            BusEvent::MessageCreated {
                conversation_id,
                message,
            } => self.apply_live_message(conversation_id, message),
            BusEvent::TypingChanged {
                conversation_id,
                user_id,
                is_typing,
            } => self.apply_typing(conversation_id, user_id, is_typing),
            BusEvent::ConversationRemoved { conversation_id } => {
                self.handle_conversation_removed(conversation_id)
            }
        }
    }

    fn apply_live_message(&mut self, conversation_id: String, record: MessageRecord) {
        let is_active = self.active_conversation_id().as_deref() == Some(conversation_id.as_str());
        let is_own = record.sender_id == self.local_user_id;

        let message = self.chat_message_from_record(&record);
        let was_new = self.messages.append_live(&conversation_id, message);

        let outcome = self.conversations.apply_message_created(
            &conversation_id,
            MessageSummary::from(&record),
            was_new,
            is_active || is_own,
        );
        match outcome {
            MessageApplied::UnknownConversation => {
                let err = SyncError::UnknownConversation {
                    conversation_id: conversation_id.clone(),
                };
                // Brand-new conversation from a counterparty; the message is
                // already held, the refresh surfaces its conversation.
                tracing::info!(%err, "forcing snapshot refresh");
                self.fetch_conversation_list();
            }
            MessageApplied::Applied { .. } => {
                if was_new {
                    self.refresh_conversation_list();
                }
            }
        }

        if was_new && is_active {
            self.refresh_active_view();
            self.emit_scroll_to_latest(&conversation_id);
            if !is_own {
                // Viewed messages count as read; keep the server in step.
                self.spawn_mark_read(conversation_id, false);
            }
        }
    }

    fn apply_typing(&mut self, conversation_id: String, user_id: String, is_typing: bool) {
        if user_id == self.local_user_id {
            // Own typing echo is never rendered back.
            return;
        }
        let changed = self
            .presence
            .set_typing(&conversation_id, &user_id, is_typing, now_ms());
        if changed {
            self.refresh_conversation_list();
            if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
                self.refresh_active_view();
            }
        }
        if is_typing {
            self.schedule_presence_sweep();
        }
    }

    fn handle_conversation_removed(&mut self, conversation_id: String) {
        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            // The server already tore the room down: clear the pointer but
            // send no leave intent.
            self.stop_composing();
            self.state.active_conversation = None;
            self.fetch_token = self.fetch_token.wrapping_add(1);
            self.set_busy(|b| b.switching = false);
            self.emit_active_conversation();
        }
        self.remove_conversation_locally(&conversation_id);
    }

    fn handle_messages_fetched(
        &mut self,
        conversation_id: String,
        token: u64,
        before_id: Option<String>,
        limit: u32,
        result: Result<Vec<MessageRecord>, crate::backend::BackendError>,
    ) {
        let active = self.active_conversation_id();
        if token != self.fetch_token || active.as_deref() != Some(conversation_id.as_str()) {
            let err = SyncError::StaleResult { conversation_id };
            tracing::debug!(%err, "dropping fetch result");
            return;
        }
        match result {
            Ok(records) => {
                let full_page = limit > 0 && records.len() as u32 >= limit;
                let page: Vec<ChatMessage> = records
                    .iter()
                    .map(|r| self.chat_message_from_record(r))
                    .collect();
                let added = self.messages.merge_page(&conversation_id, page);
                tracing::debug!(
                    %conversation_id,
                    added,
                    older = before_id.is_some(),
                    "message page merged"
                );
                self.can_load_older.insert(conversation_id, full_page);
                self.set_busy(|b| b.switching = false);
                self.refresh_active_view();
            }
            Err(err) => {
                let err = SyncError::Network(err);
                tracing::warn!(%conversation_id, %err, "message fetch failed");
                // Selection stands; the view keeps whatever is cached and the
                // user can re-select (or wait for reconnect) to retry.
                self.set_busy(|b| b.switching = false);
                if err.is_retryable() {
                    self.toast("Couldn't load messages, try again");
                }
                self.refresh_active_view();
            }
        }
    }

    fn handle_send_completed(
        &mut self,
        conversation_id: String,
        local_id: String,
        result: Result<MessageRecord, crate::backend::BackendError>,
    ) {
        match result {
            Ok(record) => {
                self.pending_sends.remove(&local_id);
                let confirmed = self.chat_message_from_record(&record);
                self.messages
                    .reconcile_optimistic(&conversation_id, &local_id, confirmed);
                let summary_changed = self.conversations.reconcile_last_message(
                    &conversation_id,
                    &local_id,
                    MessageSummary::from(&record),
                );
                if summary_changed {
                    self.refresh_conversation_list();
                }
                if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
                    self.refresh_active_view();
                }
            }
            Err(err) => {
                let reason = err.to_string();
                let err = SyncError::Network(err);
                tracing::warn!(%conversation_id, %local_id, %err, "send failed");
                self.messages
                    .mark_failed(&conversation_id, &local_id, &reason);
                if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
                    self.refresh_active_view();
                }
                if err.is_retryable() {
                    self.toast("Message failed to send, tap to retry");
                } else {
                    self.toast("Message failed to send");
                }
                // pending_sends keeps the entry: that's the retry content.
            }
        }
    }

    fn select_conversation(&mut self, conversation_id: String) {
        if !self.conversations.contains(&conversation_id) {
            self.toast("Conversation not found");
            return;
        }
        let previous = self.active_conversation_id();
        let reselect = previous.as_deref() == Some(conversation_id.as_str());

        if !reselect {
            self.stop_composing();
            if let Some(prev) = previous {
                self.bus.emit(BusIntent::LeaveConversation {
                    conversation_id: prev,
                });
            }
            self.bus.emit(BusIntent::JoinConversation {
                conversation_id: conversation_id.clone(),
            });
        }

        // Counter zeroes at selection time, independent of the server ack.
        if self.conversations.mark_read(&conversation_id) {
            self.refresh_conversation_list();
        }
        self.spawn_mark_read(conversation_id.clone(), true);

        // Mount the view immediately with whatever is cached; the page fetch
        // completes it.
        self.state.active_conversation = Some(self.build_view(&conversation_id));
        self.emit_active_conversation();
        self.set_busy(|b| b.switching = true);

        self.fetch_token = self.fetch_token.wrapping_add(1);
        let limit = self.config.message_page_size;
        self.spawn_fetch_messages(conversation_id, self.fetch_token, None, limit);
    }

    fn close_conversation(&mut self) {
        let Some(view) = self.state.active_conversation.take() else {
            return;
        };
        let conversation_id = view.conversation_id;
        self.stop_composing();
        self.bus.emit(BusIntent::LeaveConversation { conversation_id });
        // Anything still in flight for the old view is stale now.
        self.fetch_token = self.fetch_token.wrapping_add(1);
        self.set_busy(|b| b.switching = false);
        self.emit_active_conversation();
    }

    fn send_message(&mut self, conversation_id: String, content: String, kind: MessageKind) {
        let content = match validate_content(&content) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(%err, "send rejected");
                return;
            }
        };
        if !self.conversations.contains(&conversation_id) {
            self.toast("Conversation not found");
            return;
        }

        // Wall clocks can collide under rapid sends; keep outgoing timestamps
        // strictly monotonic so equal-timestamp ties cannot reorder sends.
        let ts = {
            let now = now_ms();
            if now <= self.last_outgoing_ts {
                self.last_outgoing_ts += 1;
            } else {
                self.last_outgoing_ts = now;
            }
            self.last_outgoing_ts
        };

        let local_id = format!("local-{}", Uuid::new_v4());
        let message = ChatMessage {
            id: local_id.clone(),
            sender_id: self.local_user_id.clone(),
            content: content.clone(),
            kind,
            created_at: ts,
            is_mine: true,
            delivery: MessageDeliveryState::Pending,
        };
        self.messages.append_live(&conversation_id, message);
        self.conversations.apply_message_created(
            &conversation_id,
            MessageSummary {
                id: local_id.clone(),
                content: content.clone(),
                created_at: ts,
                sender_id: self.local_user_id.clone(),
            },
            true,
            true,
        );
        self.pending_sends.insert(
            local_id.clone(),
            PendingSend {
                conversation_id: conversation_id.clone(),
                content: content.clone(),
                kind,
            },
        );

        // Sending ends the current typing burst immediately.
        self.stop_composing();

        self.refresh_conversation_list();
        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            self.refresh_active_view();
        }

        self.spawn_send(conversation_id, local_id, content, kind);
    }

    fn retry_message(&mut self, conversation_id: String, message_id: String) {
        let Some(pending) = self.pending_sends.get(&message_id).cloned() else {
            self.toast("Nothing to retry");
            return;
        };
        if pending.conversation_id != conversation_id {
            tracing::debug!(%conversation_id, %message_id, "retry for mismatched conversation");
            return;
        }
        if self.messages.mark_pending(&conversation_id, &message_id) {
            if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
                self.refresh_active_view();
            }
        }
        self.spawn_send(conversation_id, message_id, pending.content, pending.kind);
    }

    fn load_older_messages(
        &mut self,
        conversation_id: String,
        before_message_id: String,
        limit: u32,
    ) {
        if self.active_conversation_id().as_deref() != Some(conversation_id.as_str()) {
            tracing::debug!(%conversation_id, "older-page request for inactive conversation");
            return;
        }
        let limit = limit.max(1);
        self.spawn_fetch_messages(
            conversation_id,
            self.fetch_token,
            Some(before_message_id),
            limit,
        );
    }

    fn composer_activity(&mut self, conversation_id: String) {
        if self.active_conversation_id().as_deref() != Some(conversation_id.as_str()) {
            return;
        }
        if self.composing_in.as_deref() != Some(conversation_id.as_str()) {
            // New burst: exactly one start intent.
            self.composing_in = Some(conversation_id.clone());
            self.bus.emit(BusIntent::SendTyping {
                conversation_id: conversation_id.clone(),
                is_typing: true,
            });
        }
        self.composing_seq = self.composing_seq.wrapping_add(1);
        let seq = self.composing_seq;
        let idle = Duration::from_millis(self.config.typing_idle_ms);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::TypingIdleTimeout {
                    conversation_id,
                    seq,
                },
            )));
        });
    }

    fn stop_composing(&mut self) {
        if let Some(conversation_id) = self.composing_in.take() {
            self.composing_seq = self.composing_seq.wrapping_add(1);
            self.bus.emit(BusIntent::SendTyping {
                conversation_id,
                is_typing: false,
            });
        }
    }

    fn start_conversation(&mut self, user_id: String) {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            self.toast("Enter a user to start a conversation");
            return;
        }
        self.set_busy(|b| b.starting_conversation = true);
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.start_conversation(&user_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationStarted { user_id, result },
            )));
        });
    }

    fn delete_conversation(&mut self, conversation_id: String) {
        if !self.conversations.contains(&conversation_id) {
            return;
        }
        if self.active_conversation_id().as_deref() == Some(conversation_id.as_str()) {
            self.close_conversation();
        }
        // Optimistic: the entry goes away now; a failure surfaces as a
        // notice, never a rollback.
        self.remove_conversation_locally(&conversation_id);
        self.spawn_delete(conversation_id);
    }

    fn remove_conversation_locally(&mut self, conversation_id: &str) {
        let existed = self.conversations.apply_removed(conversation_id);
        self.messages.remove_conversation(conversation_id);
        self.presence.remove_conversation(conversation_id);
        self.can_load_older.remove(conversation_id);
        self.pending_sends
            .retain(|_, p| p.conversation_id != conversation_id);
        if existed {
            self.refresh_conversation_list();
        }
    }

    fn foregrounded(&mut self) {
        self.emit_full_state();
        self.start_poll_loop();
        self.fetch_conversation_list();
        if let Some(conversation_id) = self.active_conversation_id() {
            self.fetch_token = self.fetch_token.wrapping_add(1);
            let limit = self.config.message_page_size;
            self.spawn_fetch_messages(conversation_id, self.fetch_token, None, limit);
        }
    }

    fn backgrounded(&mut self) {
        self.stop_poll_loop();
    }

    fn schedule_presence_sweep(&mut self) {
        if self.sweep_scheduled {
            return;
        }
        let Some(delay) = self.presence.next_expiry_in_ms(now_ms()) else {
            return;
        };
        self.sweep_scheduled = true;
        // Small slack so swept entries are actually past expiry.
        let delay = Duration::from_millis(delay.max(0) as u64 + 25);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PresenceSweep)));
        });
    }
}

fn validate_content(content: &str) -> Result<String, SyncError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SyncError::EmptyMessage);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::validate_content;

    #[test]
    fn content_is_trimmed_and_empty_is_rejected() {
        assert_eq!(validate_content("  hi  ").unwrap(), "hi");
        assert!(validate_content("").is_err());
        assert!(validate_content("   \n\t").is_err());
    }
}
