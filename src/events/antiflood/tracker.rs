//! Per-user message counting.
//!
//! One table maps every active `(chat, user)` pair to its running count. The
//! whole read-decide-update of an observation happens under a single lock, so
//! concurrent messages from the same user are linearized and an episode can
//! only end in one violation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use teloxide::types::{ChatId, UserId};

use crate::database::ChatFloodConfig;

/// Table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FloodKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

/// Running count of one user's current episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackerEntry {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl TrackerEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }
}

/// Shared tracking table.
///
/// Cloning is cheap and shares the same table. Only [`FloodTracker`] and
/// [`super::FloodReaper`] hold one.
#[derive(Clone, Default)]
pub struct FloodTable {
    inner: Arc<Mutex<HashMap<FloodKey, TrackerEntry>>>,
}

impl FloodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the table. Never hold the guard across an `.await`.
    pub(super) fn lock(&self) -> MutexGuard<'_, HashMap<FloodKey, TrackerEntry>> {
        self.inner.lock()
    }
}

/// Outcome of observing one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodDecision {
    Ignore,
    Violation,
}

/// Counts messages and decides when a user crossed the chat's limit.
#[derive(Clone)]
pub struct FloodTracker {
    table: FloodTable,
}

impl FloodTracker {
    pub fn new(table: FloodTable) -> Self {
        Self { table }
    }

    /// Record a message and decide whether it ends the episode in a violation.
    ///
    /// The caller must already have checked that the sender is not exempt and
    /// that `settings.limit > 0`. The first message of an episode never
    /// triggers. A violation removes the entry, so the next message starts a
    /// fresh episode.
    pub fn observe(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: DateTime<Utc>,
        settings: &ChatFloodConfig,
    ) -> FloodDecision {
        let key = FloodKey { chat_id, user_id };
        let mut table = self.table.lock();

        let Some(entry) = table.get_mut(&key) else {
            table.insert(key, TrackerEntry::new(now));
            return FloodDecision::Ignore;
        };

        entry.count += 1;

        let threshold = match settings.timer {
            None => settings.limit,
            Some(timer) => match timer.valid() {
                // Corrupted timer record; count against the flat limit.
                None => settings.limit,
                Some((messages, seconds)) => {
                    let window = i64::try_from(seconds)
                        .ok()
                        .and_then(Duration::try_seconds)
                        .unwrap_or(Duration::MAX);
                    let elapsed = now - entry.window_start;

                    if elapsed > window {
                        *entry = TrackerEntry::new(now);
                        return FloodDecision::Ignore;
                    }
                    messages
                }
            },
        };

        if entry.count >= threshold {
            table.remove(&key);
            FloodDecision::Violation
        } else {
            FloodDecision::Ignore
        }
    }

    /// Drop every entry of a chat.
    pub fn forget_chat(&self, chat_id: ChatId) -> usize {
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|key, _| key.chat_id != chat_id);
        before - table.len()
    }

    /// Current episode count for a user, if one is running.
    #[cfg(test)]
    pub fn count_for(&self, chat_id: ChatId, user_id: UserId) -> Option<u32> {
        self.table
            .lock()
            .get(&FloodKey { chat_id, user_id })
            .map(|entry| entry.count)
    }

    /// Number of tracked `(chat, user)` pairs.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::FloodTimer;

    const CHAT: ChatId = ChatId(-100);
    const USER: UserId = UserId(42);

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn flat(limit: u32) -> ChatFloodConfig {
        ChatFloodConfig {
            limit,
            ..ChatFloodConfig::new(CHAT.0)
        }
    }

    fn windowed(messages: u32, seconds: u64) -> ChatFloodConfig {
        ChatFloodConfig {
            timer: Some(FloodTimer { messages, seconds }),
            ..ChatFloodConfig::new(CHAT.0)
        }
    }

    #[test]
    fn test_flat_limit_triggers_once_then_resets() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = flat(5);

        for i in 0..4 {
            assert_eq!(
                tracker.observe(CHAT, USER, t0() + secs(i), &settings),
                FloodDecision::Ignore
            );
        }
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(4), &settings),
            FloodDecision::Violation
        );
        assert_eq!(tracker.count_for(CHAT, USER), None);

        // Next message opens a new episode at count 1.
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(5), &settings),
            FloodDecision::Ignore
        );
        assert_eq!(tracker.count_for(CHAT, USER), Some(1));
    }

    #[test]
    fn test_flat_policy_ignores_elapsed_time() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = flat(3);

        tracker.observe(CHAT, USER, t0(), &settings);
        tracker.observe(CHAT, USER, t0() + secs(1000), &settings);
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(2000), &settings),
            FloodDecision::Violation
        );
    }

    #[test]
    fn test_windowed_triggers_inside_window() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = windowed(3, 10);

        assert_eq!(tracker.observe(CHAT, USER, t0(), &settings), FloodDecision::Ignore);
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(4), &settings),
            FloodDecision::Ignore
        );
        // Exactly at the window edge still counts as inside.
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(10), &settings),
            FloodDecision::Violation
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_windowed_expiry_resets_silently() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = windowed(3, 10);

        tracker.observe(CHAT, USER, t0(), &settings);
        tracker.observe(CHAT, USER, t0() + secs(5), &settings);
        // Window elapsed before the third message: new episode from here.
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(11), &settings),
            FloodDecision::Ignore
        );
        assert_eq!(tracker.count_for(CHAT, USER), Some(1));

        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(12), &settings),
            FloodDecision::Ignore
        );
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(13), &settings),
            FloodDecision::Violation
        );
    }

    #[test]
    fn test_windowed_uses_timer_not_limit() {
        let tracker = FloodTracker::new(FloodTable::new());
        let mut settings = windowed(10, 60);
        settings.limit = 2;

        for i in 0..9 {
            assert_eq!(
                tracker.observe(CHAT, USER, t0() + secs(i), &settings),
                FloodDecision::Ignore
            );
        }
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(9), &settings),
            FloodDecision::Violation
        );
    }

    #[test]
    fn test_corrupted_timer_falls_back_to_limit() {
        let tracker = FloodTracker::new(FloodTable::new());
        let mut settings = windowed(0, 10);
        settings.limit = 3;

        tracker.observe(CHAT, USER, t0(), &settings);
        tracker.observe(CHAT, USER, t0() + secs(100), &settings);
        assert_eq!(
            tracker.observe(CHAT, USER, t0() + secs(200), &settings),
            FloodDecision::Violation
        );
    }

    #[test]
    fn test_users_and_chats_are_independent() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = flat(2);

        tracker.observe(CHAT, USER, t0(), &settings);
        assert_eq!(
            tracker.observe(CHAT, UserId(7), t0(), &settings),
            FloodDecision::Ignore
        );
        assert_eq!(
            tracker.observe(ChatId(-200), USER, t0(), &settings),
            FloodDecision::Ignore
        );
        assert_eq!(tracker.len(), 3);
        assert_eq!(
            tracker.observe(CHAT, USER, t0(), &settings),
            FloodDecision::Violation
        );
    }

    #[test]
    fn test_forget_chat() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = flat(5);

        tracker.observe(CHAT, USER, t0(), &settings);
        tracker.observe(CHAT, UserId(7), t0(), &settings);
        tracker.observe(ChatId(-200), USER, t0(), &settings);

        assert_eq!(tracker.forget_chat(CHAT), 2);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.count_for(ChatId(-200), USER), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observes_linearize() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = Arc::new(flat(10));
        let calls = 15;

        let handles: Vec<_> = (0..calls)
            .map(|_| {
                let tracker = tracker.clone();
                let settings = Arc::clone(&settings);
                tokio::spawn(async move { tracker.observe(CHAT, USER, t0(), &settings) })
            })
            .collect();

        let mut violations = 0;
        for handle in handles {
            if handle.await.unwrap() == FloodDecision::Violation {
                violations += 1;
            }
        }

        assert_eq!(violations, 1);
        assert_eq!(tracker.count_for(CHAT, USER), Some(calls - 10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observes_with_existing_count() {
        let tracker = FloodTracker::new(FloodTable::new());
        let settings = Arc::new(flat(10));

        // Pre-existing count C = 6.
        for _ in 0..6 {
            tracker.observe(CHAT, USER, t0(), &settings);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                let settings = Arc::clone(&settings);
                tokio::spawn(async move { tracker.observe(CHAT, USER, t0(), &settings) })
            })
            .collect();

        let mut violations = 0;
        for handle in handles {
            if handle.await.unwrap() == FloodDecision::Violation {
                violations += 1;
            }
        }

        // 6 + 8 = 14 >= 10: one violation, the remaining 4 open a new episode.
        assert_eq!(violations, 1);
        assert_eq!(tracker.count_for(CHAT, USER), Some(4));
    }
}
