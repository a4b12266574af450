use std::collections::HashMap;

/// Typing indicators keyed by (conversation, user), each carrying an
/// absolute expiry in Unix milliseconds.
///
/// Expiry is enforced at read time: an entry past its expiry is absent even
/// if no sweep has run yet, so a lost "stopped typing" event can never pin a
/// stale indicator. Sweeps only reclaim memory and tell the caller that a
/// previously rendered indicator needs to disappear from the view.
pub struct PresenceTracker {
    ttl_ms: i64,
    entries: HashMap<(String, String), i64>,
}

impl PresenceTracker {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            ttl_ms,
            entries: HashMap::new(),
        }
    }

    /// Record a typing transition. `true` sets or refreshes the expiry;
    /// `false` removes immediately. Returns whether the visible state for
    /// this (conversation, user) changed.
    pub fn set_typing(
        &mut self,
        conversation_id: &str,
        user_id: &str,
        is_typing: bool,
        now_ms: i64,
    ) -> bool {
        let key = (conversation_id.to_string(), user_id.to_string());
        if is_typing {
            let was_visible = self
                .entries
                .get(&key)
                .is_some_and(|&expires_at| expires_at > now_ms);
            self.entries.insert(key, now_ms + self.ttl_ms);
            !was_visible
        } else {
            self.entries
                .remove(&key)
                .is_some_and(|expires_at| expires_at > now_ms)
        }
    }

    pub fn is_typing(&self, conversation_id: &str, user_id: &str, now_ms: i64) -> bool {
        self.entries
            .get(&(conversation_id.to_string(), user_id.to_string()))
            .is_some_and(|&expires_at| expires_at > now_ms)
    }

    /// Visible typers for one conversation, sorted for stable rendering.
    pub fn typing_users(&self, conversation_id: &str, now_ms: i64) -> Vec<String> {
        let mut users: Vec<String> = self
            .entries
            .iter()
            .filter(|((convo, _), &expires_at)| convo == conversation_id && expires_at > now_ms)
            .map(|((_, user), _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Drop expired entries. Returns whether anything was removed, which is
    /// the signal that a rendered indicator may need to go away.
    pub fn sweep(&mut self, now_ms: i64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now_ms);
        self.entries.len() != before
    }

    /// Milliseconds until the soonest expiry, for scheduling the next sweep.
    /// `None` when nothing is tracked.
    pub fn next_expiry_in_ms(&self, now_ms: i64) -> Option<i64> {
        self.entries
            .values()
            .map(|&expires_at| (expires_at - now_ms).max(0))
            .min()
    }

    pub fn remove_conversation(&mut self, conversation_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(convo, _), _| convo != conversation_id);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_expires_at_read_time_without_sweep() {
        let mut tracker = PresenceTracker::new(3_000);
        tracker.set_typing("z", "u1", true, 0);
        assert!(tracker.is_typing("z", "u1", 2_999));
        assert!(!tracker.is_typing("z", "u1", 3_000));
        assert!(!tracker.is_typing("z", "u1", 5_000));
    }

    #[test]
    fn true_refreshes_expiry() {
        let mut tracker = PresenceTracker::new(3_000);
        assert!(tracker.set_typing("z", "u1", true, 0));
        // Refresh just before expiry: no visible change, but the window moves.
        assert!(!tracker.set_typing("z", "u1", true, 2_500));
        assert!(tracker.is_typing("z", "u1", 4_000));
        assert!(!tracker.is_typing("z", "u1", 5_500));
    }

    #[test]
    fn false_removes_immediately() {
        let mut tracker = PresenceTracker::new(3_000);
        tracker.set_typing("z", "u1", true, 0);
        assert!(tracker.set_typing("z", "u1", false, 1));
        assert!(!tracker.is_typing("z", "u1", 2));
        // Removing an already absent entry reports no visible change.
        assert!(!tracker.set_typing("z", "u1", false, 3));
    }

    #[test]
    fn typing_users_filters_expired_and_sorts() {
        let mut tracker = PresenceTracker::new(3_000);
        tracker.set_typing("z", "u2", true, 0);
        tracker.set_typing("z", "u1", true, 1_000);
        tracker.set_typing("other", "u9", true, 1_000);
        assert_eq!(tracker.typing_users("z", 2_000), ["u1", "u2"]);
        // u2 expired at 3000, u1 lives until 4000.
        assert_eq!(tracker.typing_users("z", 3_500), ["u1"]);
    }

    #[test]
    fn sweep_reclaims_and_reports_removals() {
        let mut tracker = PresenceTracker::new(3_000);
        tracker.set_typing("z", "u1", true, 0);
        assert!(!tracker.sweep(1_000));
        assert!(tracker.sweep(3_000));
        assert!(tracker.is_empty());
        assert!(!tracker.sweep(4_000));
    }

    #[test]
    fn next_expiry_points_at_soonest_entry() {
        let mut tracker = PresenceTracker::new(3_000);
        assert_eq!(tracker.next_expiry_in_ms(0), None);
        tracker.set_typing("z", "u1", true, 0);
        tracker.set_typing("z", "u2", true, 1_000);
        assert_eq!(tracker.next_expiry_in_ms(1_000), Some(2_000));
        // Past-due entries report zero, not negative.
        assert_eq!(tracker.next_expiry_in_ms(10_000), Some(0));
    }

    #[test]
    fn remove_conversation_clears_its_indicators() {
        let mut tracker = PresenceTracker::new(3_000);
        tracker.set_typing("z", "u1", true, 0);
        tracker.set_typing("other", "u2", true, 0);
        assert!(tracker.remove_conversation("z"));
        assert!(!tracker.is_typing("z", "u1", 1));
        assert!(tracker.is_typing("other", "u2", 1));
    }
}
