use std::collections::{HashMap, HashSet};

use crate::state::{ChatMessage, MessageDeliveryState};

#[derive(Default)]
struct Thread {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

/// Per-conversation ordered message lists with id-based de-duplication.
///
/// Ordering invariant: ascending `created_at`, arrival order preserved among
/// equal timestamps. Inserts go through `partition_point`, so merges never
/// re-sort the whole list; a full re-sort could shuffle optimistic and
/// confirmed entries whose ids are not comparable.
#[derive(Default)]
pub struct MessageStore {
    threads: HashMap<String, Thread>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one live message if its id is new. Returns whether it was new;
    /// the conversation store uses that verdict to avoid double counting.
    pub fn append_live(&mut self, conversation_id: &str, message: ChatMessage) -> bool {
        let thread = self.threads.entry(conversation_id.to_string()).or_default();
        if thread.ids.contains(&message.id) {
            return false;
        }
        Self::insert_ordered(thread, message);
        true
    }

    /// Merge a fetched page. Ids already held win; nothing is overwritten or
    /// truncated, since a page fetch can race behind a live event and must
    /// not drop the newer arrivals it missed. Returns how many entries were
    /// new.
    pub fn merge_page(&mut self, conversation_id: &str, page: Vec<ChatMessage>) -> usize {
        let thread = self.threads.entry(conversation_id.to_string()).or_default();
        let mut added = 0;
        for message in page {
            if thread.ids.contains(&message.id) {
                continue;
            }
            Self::insert_ordered(thread, message);
            added += 1;
        }
        added
    }

    /// Replace a pending optimistic entry with the server-confirmed message,
    /// keeping its list position. If the confirmed id already landed as a
    /// live event, the optimistic entry is dropped instead of duplicated.
    /// Returns false when the local id is gone (already reconciled).
    pub fn reconcile_optimistic(
        &mut self,
        conversation_id: &str,
        local_id: &str,
        confirmed: ChatMessage,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(conversation_id) else {
            return false;
        };
        let Some(idx) = thread.messages.iter().position(|m| m.id == local_id) else {
            return false;
        };
        thread.ids.remove(local_id);
        if thread.ids.contains(&confirmed.id) {
            thread.messages.remove(idx);
        } else {
            thread.ids.insert(confirmed.id.clone());
            thread.messages[idx] = confirmed;
        }
        true
    }

    /// Flag a pending entry as failed, keeping it (and its content) in place
    /// so the user can retry without losing the draft.
    pub fn mark_failed(&mut self, conversation_id: &str, local_id: &str, reason: &str) -> bool {
        self.set_delivery(
            conversation_id,
            local_id,
            MessageDeliveryState::Failed {
                reason: reason.to_string(),
            },
        )
    }

    /// Flip a failed entry back to pending for a retry.
    pub fn mark_pending(&mut self, conversation_id: &str, local_id: &str) -> bool {
        self.set_delivery(conversation_id, local_id, MessageDeliveryState::Pending)
    }

    pub fn contains(&self, conversation_id: &str, message_id: &str) -> bool {
        self.threads
            .get(conversation_id)
            .is_some_and(|t| t.ids.contains(message_id))
    }

    pub fn messages(&self, conversation_id: &str) -> &[ChatMessage] {
        self.threads
            .get(conversation_id)
            .map(|t| t.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn remove_conversation(&mut self, conversation_id: &str) {
        self.threads.remove(conversation_id);
    }

    fn insert_ordered(thread: &mut Thread, message: ChatMessage) {
        // After all entries with created_at <= new: equal timestamps keep
        // arrival order.
        let at = thread
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        thread.ids.insert(message.id.clone());
        thread.messages.insert(at, message);
    }

    fn set_delivery(
        &mut self,
        conversation_id: &str,
        local_id: &str,
        delivery: MessageDeliveryState,
    ) -> bool {
        let Some(thread) = self.threads.get_mut(conversation_id) else {
            return false;
        };
        match thread.messages.iter_mut().find(|m| m.id == local_id) {
            Some(message) => {
                message.delivery = delivery;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MessageKind;

    fn msg(id: &str, created_at: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "u2".to_string(),
            content: format!("body of {id}"),
            kind: MessageKind::Text,
            created_at,
            is_mine: false,
            delivery: MessageDeliveryState::Sent,
        }
    }

    fn mine(id: &str, created_at: i64, delivery: MessageDeliveryState) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "u1".to_string(),
            content: format!("body of {id}"),
            kind: MessageKind::Text,
            created_at,
            is_mine: true,
            delivery,
        }
    }

    fn ids(store: &MessageStore, conversation_id: &str) -> Vec<String> {
        store
            .messages(conversation_id)
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    #[test]
    fn append_live_dedups_by_id() {
        let mut store = MessageStore::new();
        assert!(store.append_live("c1", msg("m1", 10)));
        assert!(!store.append_live("c1", msg("m1", 10)));
        assert_eq!(store.messages("c1").len(), 1);
    }

    #[test]
    fn page_and_live_merge_without_duplicates() {
        let mut store = MessageStore::new();
        // Live event lands first.
        store.append_live("c1", msg("m3", 30));
        // The page that was already in flight contains it again.
        let added = store.merge_page("c1", vec![msg("m1", 10), msg("m2", 20), msg("m3", 30)]);
        assert_eq!(added, 2);
        assert_eq!(ids(&store, "c1"), ["m1", "m2", "m3"]);
    }

    #[test]
    fn merge_never_truncates_newer_messages() {
        let mut store = MessageStore::new();
        store.append_live("c1", msg("m9", 90));
        store.merge_page("c1", vec![msg("m1", 10), msg("m2", 20)]);
        assert_eq!(ids(&store, "c1"), ["m1", "m2", "m9"]);
    }

    #[test]
    fn equal_timestamps_preserve_arrival_order_across_merges() {
        let mut store = MessageStore::new();
        store.append_live("c1", msg("b", 10));
        store.append_live("c1", msg("a", 10));
        store.merge_page("c1", vec![msg("z", 10)]);
        store.merge_page("c1", vec![msg("y", 5), msg("x", 10)]);
        assert_eq!(ids(&store, "c1"), ["y", "b", "a", "z", "x"]);
    }

    #[test]
    fn older_page_is_prepended() {
        let mut store = MessageStore::new();
        store.merge_page("c1", vec![msg("m5", 50), msg("m6", 60)]);
        store.merge_page("c1", vec![msg("m1", 10), msg("m2", 20)]);
        assert_eq!(ids(&store, "c1"), ["m1", "m2", "m5", "m6"]);
    }

    #[test]
    fn reconcile_replaces_in_place() {
        let mut store = MessageStore::new();
        store.append_live("c1", msg("m1", 10));
        store.append_live("c1", mine("local-1", 20, MessageDeliveryState::Pending));
        store.append_live("c1", msg("m2", 30));

        let confirmed = mine("srv-9", 21, MessageDeliveryState::Sent);
        assert!(store.reconcile_optimistic("c1", "local-1", confirmed));
        assert_eq!(ids(&store, "c1"), ["m1", "srv-9", "m2"]);
        assert_eq!(
            store.messages("c1")[1].delivery,
            MessageDeliveryState::Sent
        );
        assert!(!store.contains("c1", "local-1"));
    }

    #[test]
    fn reconcile_drops_local_entry_when_confirmed_id_already_arrived() {
        let mut store = MessageStore::new();
        store.append_live("c1", mine("local-1", 20, MessageDeliveryState::Pending));
        // The server pushed our own message back before the write returned.
        store.append_live("c1", msg("srv-9", 21));

        assert!(store.reconcile_optimistic(
            "c1",
            "local-1",
            mine("srv-9", 21, MessageDeliveryState::Sent)
        ));
        assert_eq!(ids(&store, "c1"), ["srv-9"]);
    }

    #[test]
    fn reconcile_of_unknown_local_id_is_a_noop() {
        let mut store = MessageStore::new();
        store.append_live("c1", msg("m1", 10));
        assert!(!store.reconcile_optimistic(
            "c1",
            "gone",
            mine("srv-9", 21, MessageDeliveryState::Sent)
        ));
        assert_eq!(ids(&store, "c1"), ["m1"]);
    }

    #[test]
    fn failed_send_keeps_content_for_retry() {
        let mut store = MessageStore::new();
        store.append_live("c1", mine("local-1", 20, MessageDeliveryState::Pending));
        assert!(store.mark_failed("c1", "local-1", "timeout"));

        let kept = &store.messages("c1")[0];
        assert_eq!(kept.content, "body of local-1");
        assert_eq!(
            kept.delivery,
            MessageDeliveryState::Failed {
                reason: "timeout".to_string()
            }
        );

        assert!(store.mark_pending("c1", "local-1"));
        assert_eq!(
            store.messages("c1")[0].delivery,
            MessageDeliveryState::Pending
        );
    }

    #[test]
    fn remove_conversation_drops_thread() {
        let mut store = MessageStore::new();
        store.append_live("c1", msg("m1", 10));
        store.remove_conversation("c1");
        assert!(store.messages("c1").is_empty());
        assert!(!store.contains("c1", "m1"));
    }
}
