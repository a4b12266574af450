use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::MessageQuery;
use crate::bus::{BusEvent, EventBusAdapter};
use crate::state::MessageKind;
use crate::updates::{CoreMsg, InternalEvent};

use super::SyncCore;

/// Bound on the redelivery-dedup window in the event pump.
const SEEN_CAP: usize = 2048;

impl SyncCore {
    /// Drains the transport stream for the lifetime of the engine. Frames are
    /// normalized off the actor thread; only recognized events are queued.
    pub(super) fn start_event_pump(&self) {
        let rx = self.bus.incoming();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let mut seen: HashSet<(String, String)> = HashSet::new();
            let mut seen_order: VecDeque<(String, String)> = VecDeque::new();
            while let Ok(event) = rx.recv_async().await {
                let Some(event) = EventBusAdapter::normalize(event) else {
                    continue;
                };
                if let BusEvent::MessageCreated {
                    conversation_id,
                    message,
                } = &event
                {
                    // Transports may redeliver after a reconnect; repeats are
                    // dropped before they ever reach the queue. Ids are only
                    // unique within a conversation, so the key carries both.
                    let key = (conversation_id.clone(), message.id.clone());
                    if !seen.insert(key.clone()) {
                        tracing::debug!(
                            %conversation_id,
                            message_id = %message.id,
                            "duplicate event dropped"
                        );
                        continue;
                    }
                    seen_order.push_back(key);
                    if seen_order.len() > SEEN_CAP {
                        if let Some(oldest) = seen_order.pop_front() {
                            seen.remove(&oldest);
                        }
                    }
                }
                if tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::Bus(event))))
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!("event pump stopped");
        });
    }

    /// (Re)arms the periodic conversation-list refresh. Ticks carry the
    /// current generation token so a stopped loop cannot fire late. An
    /// interval of zero disables polling.
    pub(super) fn start_poll_loop(&mut self) {
        self.stop_poll_loop();
        if self.config.poll_interval_ms == 0 {
            return;
        }
        self.poll_token = self.poll_token.wrapping_add(1);
        let token = self.poll_token;
        let alive = Arc::new(AtomicBool::new(true));
        self.poll_alive = Some(alive.clone());
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !alive.load(Ordering::Relaxed) {
                    break;
                }
                if tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::PollTick {
                        token,
                    })))
                    .is_err()
                {
                    break;
                }
            }
            tracing::debug!("poll loop stopped");
        });
    }

    pub(super) fn stop_poll_loop(&mut self) {
        self.poll_token = self.poll_token.wrapping_add(1);
        if let Some(alive) = self.poll_alive.take() {
            alive.store(false, Ordering::Relaxed);
        }
    }

    pub(super) fn fetch_conversation_list(&self) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.list_conversations().await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::ConversationsFetched { result },
            )));
        });
    }

    pub(super) fn spawn_fetch_messages(
        &self,
        conversation_id: String,
        token: u64,
        before_id: Option<String>,
        limit: u32,
    ) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let query = match &before_id {
                Some(id) => MessageQuery::before(id.clone(), limit),
                None => MessageQuery::latest(limit),
            };
            let result = backend.list_messages(&conversation_id, query).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessagesFetched {
                conversation_id,
                token,
                before_id,
                limit,
                result,
            })));
        });
    }

    pub(super) fn spawn_send(
        &self,
        conversation_id: String,
        local_id: String,
        content: String,
        kind: MessageKind,
    ) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.send_message(&conversation_id, &content, kind).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                conversation_id,
                local_id,
                result,
            })));
        });
    }

    pub(super) fn spawn_mark_read(&self, conversation_id: String, user_initiated: bool) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.mark_read(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::MarkReadCompleted {
                    conversation_id,
                    user_initiated,
                    result,
                },
            )));
        });
    }

    pub(super) fn spawn_delete(&self, conversation_id: String) {
        let backend = self.backend.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = backend.delete_conversation(&conversation_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::DeleteCompleted {
                conversation_id,
                result,
            })));
        });
    }
}
