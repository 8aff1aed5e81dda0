//! Messages broadcast while no console was connected

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use stream_console_core::config::ReplayPolicy;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacklogEntry {
    pub message: String,
    pub queued_at: DateTime<Utc>,
}

/// Bounded FIFO of undelivered broadcasts
///
/// Order of entries is always the order in which they were offered.
#[derive(Debug)]
pub struct Backlog {
    entries: VecDeque<BacklogEntry>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl Backlog {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a message, evicting the oldest entry when full
    pub fn push(&mut self, message: String) {
        self.push_at(message, Utc::now());
    }

    pub(crate) fn push_at(&mut self, message: String, now: DateTime<Utc>) {
        self.prune_expired_at(now);
        self.entries.push_back(BacklogEntry {
            message,
            queued_at: now,
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                warn!(queued_at = %evicted.queued_at, "Backlog full, dropping oldest message");
            }
        }
    }

    /// Remove entries older than the TTL, returning how many were dropped
    pub fn prune_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let before = self.entries.len();
        self.entries.retain(|entry| {
            (now - entry.queued_at)
                .to_std()
                .map(|age| age <= ttl)
                .unwrap_or(true)
        });
        before - self.entries.len()
    }

    /// Remove and return the entries a newly registered console should see
    ///
    /// `Last(n)` discards everything older than the newest `n` entries.
    pub fn take_for_replay(&mut self, policy: ReplayPolicy) -> Vec<BacklogEntry> {
        self.prune_expired_at(Utc::now());
        match policy {
            ReplayPolicy::None => Vec::new(),
            ReplayPolicy::All => self.entries.drain(..).collect(),
            ReplayPolicy::Last(n) => {
                let skip = self.entries.len().saturating_sub(n);
                self.entries.drain(..).skip(skip).collect()
            }
        }
    }

    /// Put undelivered replay entries back at the head of the backlog
    pub fn restore_front(&mut self, entries: Vec<BacklogEntry>) {
        for entry in entries.into_iter().rev() {
            self.entries.push_front(entry);
        }
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Backlogged messages, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backlog_with(messages: &[&str]) -> Backlog {
        let mut backlog = Backlog::new(10, None);
        for m in messages {
            backlog.push(m.to_string());
        }
        backlog
    }

    #[test]
    fn test_push_preserves_order() {
        let backlog = backlog_with(&["a", "b", "c"]);
        assert_eq!(backlog.messages(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut backlog = Backlog::new(2, None);
        backlog.push("a".into());
        backlog.push("b".into());
        backlog.push("c".into());
        assert_eq!(backlog.messages(), vec!["b", "c"]);
    }

    #[test]
    fn test_ttl_prunes_old_entries() {
        let mut backlog = Backlog::new(10, Some(Duration::from_secs(60)));
        let start = Utc::now();
        backlog.push_at("old".into(), start);
        backlog.push_at("new".into(), start + chrono::Duration::seconds(50));

        let dropped = backlog.prune_expired_at(start + chrono::Duration::seconds(90));
        assert_eq!(dropped, 1);
        assert_eq!(backlog.messages(), vec!["new"]);
    }

    #[test]
    fn test_replay_none_keeps_backlog() {
        let mut backlog = backlog_with(&["a", "b"]);
        assert!(backlog.take_for_replay(ReplayPolicy::None).is_empty());
        assert_eq!(backlog.len(), 2);
    }

    #[test]
    fn test_replay_all_drains_in_order() {
        let mut backlog = backlog_with(&["a", "b", "c"]);
        let replay: Vec<_> = backlog
            .take_for_replay(ReplayPolicy::All)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(replay, vec!["a", "b", "c"]);
        assert!(backlog.is_empty());
    }

    #[test]
    fn test_replay_last_keeps_newest() {
        let mut backlog = backlog_with(&["a", "b", "c", "d"]);
        let replay: Vec<_> = backlog
            .take_for_replay(ReplayPolicy::Last(2))
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(replay, vec!["c", "d"]);
        assert!(backlog.is_empty());
    }

    #[test]
    fn test_restore_front_puts_entries_back_first() {
        let mut backlog = backlog_with(&["a", "b"]);
        let taken = backlog.take_for_replay(ReplayPolicy::All);
        backlog.push("c".into());
        backlog.restore_front(taken);
        assert_eq!(backlog.messages(), vec!["a", "b", "c"]);
    }
}
