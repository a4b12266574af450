use std::cmp::Reverse;

use crate::backend::ConversationRecord;
use crate::state::{MessageSummary, Participant};

/// One conversation as the store holds it. Summary fields are replaceable
/// from snapshots; `unread_count` is locally owned once the conversation is
/// known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<Participant>,
    pub last_message: Option<MessageSummary>,
    pub unread_count: u32,
    pub updated_at: i64,
}

impl Conversation {
    fn from_record(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            participants: record.participants,
            last_message: record.last_message,
            unread_count: record.unread_count,
            updated_at: record.updated_at,
        }
    }
}

/// Outcome of applying a live message event to the conversation list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageApplied {
    Applied { unread_incremented: bool },
    /// The conversation is absent from the store; the caller should force a
    /// snapshot refresh (a counterparty may have just created it).
    UnknownConversation,
}

/// Authoritative in-memory conversation list: ordering, unread counters,
/// last-message summaries. Owned and mutated exclusively by the sync core;
/// kept sorted by `updated_at` descending at all times.
#[derive(Default)]
pub struct ConversationStore {
    items: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == conversation_id)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.get(conversation_id).is_some()
    }

    /// The list in render order.
    pub fn ordered(&self) -> &[Conversation] {
        &self.items
    }

    /// Merge a conversation-list snapshot. Entries present in the snapshot
    /// get their summary fields replaced; the locally maintained unread
    /// counter is preserved for conversations already tracked. Absence never
    /// deletes: removals arrive as explicit events, and a partial snapshot
    /// must not wipe conversations it did not include. Returns whether
    /// anything visible changed.
    pub fn upsert_from_snapshot(&mut self, records: Vec<ConversationRecord>) -> bool {
        let mut changed = false;
        for record in records {
            match self.items.iter().position(|c| c.id == record.id) {
                Some(idx) => {
                    let unread_count = self.items[idx].unread_count;
                    let next = Conversation {
                        unread_count,
                        ..Conversation::from_record(record)
                    };
                    if self.items[idx] != next {
                        self.items[idx] = next;
                        changed = true;
                    }
                }
                None => {
                    self.items.push(Conversation::from_record(record));
                    changed = true;
                }
            }
        }
        if changed {
            self.sort();
        }
        changed
    }

    /// Apply an accepted live message to the summary. `was_new` is the
    /// message store's de-duplication verdict: a redelivered event must not
    /// touch the summary or the counter. `suppress_unread` is set when the
    /// conversation is active or the sender is the local user.
    pub fn apply_message_created(
        &mut self,
        conversation_id: &str,
        summary: MessageSummary,
        was_new: bool,
        suppress_unread: bool,
    ) -> MessageApplied {
        let Some(idx) = self.items.iter().position(|c| c.id == conversation_id) else {
            return MessageApplied::UnknownConversation;
        };
        if !was_new {
            return MessageApplied::Applied {
                unread_incremented: false,
            };
        }
        let convo = &mut self.items[idx];
        convo.updated_at = summary.created_at;
        convo.last_message = Some(summary);
        let unread_incremented = if suppress_unread {
            false
        } else {
            convo.unread_count += 1;
            true
        };
        self.sort();
        MessageApplied::Applied { unread_incremented }
    }

    /// Remove a conversation. Returns whether it existed.
    pub fn apply_removed(&mut self, conversation_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|c| c.id != conversation_id);
        self.items.len() != before
    }

    /// Swap an optimistic last-message summary for its confirmed form. Only
    /// applies while the summary still names the optimistic id; if newer
    /// traffic already replaced it, the confirmation must not regress it.
    pub fn reconcile_last_message(
        &mut self,
        conversation_id: &str,
        local_id: &str,
        summary: MessageSummary,
    ) -> bool {
        let Some(convo) = self.items.iter_mut().find(|c| c.id == conversation_id) else {
            return false;
        };
        if convo.last_message.as_ref().map(|m| m.id.as_str()) != Some(local_id) {
            return false;
        }
        convo.updated_at = summary.created_at;
        convo.last_message = Some(summary);
        self.sort();
        true
    }

    /// Zero the unread counter, optimistically and independent of any server
    /// acknowledgement. Returns whether the counter was nonzero.
    pub fn mark_read(&mut self, conversation_id: &str) -> bool {
        match self.items.iter_mut().find(|c| c.id == conversation_id) {
            Some(convo) if convo.unread_count > 0 => {
                convo.unread_count = 0;
                true
            }
            _ => false,
        }
    }

    fn sort(&mut self) {
        // Stable, so equal timestamps keep their relative order.
        self.items.sort_by_key(|c| Reverse(c.updated_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, updated_at: i64) -> ConversationRecord {
        ConversationRecord {
            id: id.to_string(),
            participants: vec![],
            last_message: None,
            unread_count: 0,
            updated_at,
        }
    }

    fn summary(id: &str, created_at: i64) -> MessageSummary {
        MessageSummary {
            id: id.to_string(),
            content: "hi".to_string(),
            created_at,
            sender_id: "u2".to_string(),
        }
    }

    #[test]
    fn snapshot_inserts_and_orders_descending() {
        let mut store = ConversationStore::new();
        assert!(store.upsert_from_snapshot(vec![record("a", 10), record("b", 30), record("c", 20)]));
        let ids: Vec<&str> = store.ordered().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn snapshot_preserves_local_unread_counter() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("a", 10)]);
        store.apply_message_created("a", summary("m1", 11), true, false);
        assert_eq!(store.get("a").unwrap().unread_count, 1);

        // A later snapshot reporting a stale server-side count must not win.
        let mut stale = record("a", 12);
        stale.unread_count = 7;
        store.upsert_from_snapshot(vec![stale]);
        assert_eq!(store.get("a").unwrap().unread_count, 1);
        assert_eq!(store.get("a").unwrap().updated_at, 12);
    }

    #[test]
    fn snapshot_seeds_server_unread_for_new_conversations() {
        let mut store = ConversationStore::new();
        let mut rec = record("a", 10);
        rec.unread_count = 4;
        store.upsert_from_snapshot(vec![rec]);
        assert_eq!(store.get("a").unwrap().unread_count, 4);
    }

    #[test]
    fn snapshot_absence_never_deletes() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("a", 10), record("b", 20)]);
        store.upsert_from_snapshot(vec![record("b", 21)]);
        assert!(store.contains("a"));
        assert!(store.contains("b"));
    }

    #[test]
    fn unchanged_snapshot_reports_no_change() {
        let mut store = ConversationStore::new();
        assert!(store.upsert_from_snapshot(vec![record("a", 10)]));
        assert!(!store.upsert_from_snapshot(vec![record("a", 10)]));
    }

    #[test]
    fn message_increments_unread_once_per_new_id() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("x", 10)]);

        let applied = store.apply_message_created("x", summary("m1", 11), true, false);
        assert_eq!(
            applied,
            MessageApplied::Applied {
                unread_incremented: true
            }
        );
        assert_eq!(store.get("x").unwrap().unread_count, 1);
        assert_eq!(store.get("x").unwrap().last_message.as_ref().unwrap().id, "m1");

        // Redelivery: the message store already saw the id, so was_new=false.
        let applied = store.apply_message_created("x", summary("m1", 11), false, false);
        assert_eq!(
            applied,
            MessageApplied::Applied {
                unread_incremented: false
            }
        );
        assert_eq!(store.get("x").unwrap().unread_count, 1);
    }

    #[test]
    fn active_or_own_messages_do_not_increment_unread() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("x", 10)]);
        store.apply_message_created("x", summary("m1", 11), true, true);
        assert_eq!(store.get("x").unwrap().unread_count, 0);
        // Summary still moves.
        assert_eq!(store.get("x").unwrap().updated_at, 11);
    }

    #[test]
    fn message_for_unknown_conversation_is_signaled() {
        let mut store = ConversationStore::new();
        assert_eq!(
            store.apply_message_created("ghost", summary("m1", 11), true, false),
            MessageApplied::UnknownConversation
        );
    }

    #[test]
    fn new_message_reorders_list() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("a", 10), record("b", 20)]);
        store.apply_message_created("a", summary("m1", 30), true, false);
        let ids: Vec<&str> = store.ordered().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn mark_read_zeroes_counter() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("x", 10)]);
        store.apply_message_created("x", summary("m1", 11), true, false);
        store.apply_message_created("x", summary("m2", 12), true, false);
        assert_eq!(store.get("x").unwrap().unread_count, 2);

        assert!(store.mark_read("x"));
        assert_eq!(store.get("x").unwrap().unread_count, 0);
        assert!(!store.mark_read("x"));
    }

    #[test]
    fn reconcile_last_message_only_touches_matching_id() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("x", 10)]);
        store.apply_message_created("x", summary("local-1", 11), true, true);

        assert!(store.reconcile_last_message("x", "local-1", summary("srv-9", 12)));
        assert_eq!(store.get("x").unwrap().last_message.as_ref().unwrap().id, "srv-9");
        assert_eq!(store.get("x").unwrap().updated_at, 12);

        // Newer traffic already replaced the summary: confirmation is a noop.
        store.apply_message_created("x", summary("m2", 13), true, false);
        assert!(!store.reconcile_last_message("x", "local-1", summary("srv-9", 12)));
        assert_eq!(store.get("x").unwrap().last_message.as_ref().unwrap().id, "m2");
    }

    #[test]
    fn removal_deletes_entry() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("a", 10)]);
        assert!(store.apply_removed("a"));
        assert!(!store.contains("a"));
        assert!(!store.apply_removed("a"));
    }

    #[test]
    fn equal_timestamps_keep_snapshot_order() {
        let mut store = ConversationStore::new();
        store.upsert_from_snapshot(vec![record("a", 10), record("b", 10), record("c", 10)]);
        let ids: Vec<&str> = store.ordered().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
