//! Pending reaction arena.
//!
//! An append-only queue of (event, ticker, window) keys. The detection pass
//! is its single consumer: it drains the queue, samples every key, and
//! requeues whatever is still unresolved. New events append concurrently.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use corelib::ReactionKey;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub key: ReactionKey,
    pub anchor: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<PendingEntry>,
    members: HashSet<ReactionKey>,
}

pub struct PendingSet {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl PendingSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
        }
    }

    /// Queues `entry`. Returns `false` when the set is full. Keys already
    /// queued are accepted without duplication.
    pub fn push(&self, entry: PendingEntry) -> bool {
        let mut g = self.inner.lock();
        if g.members.contains(&entry.key) {
            return true;
        }
        if g.queue.len() >= self.capacity {
            return false;
        }
        g.members.insert(entry.key.clone());
        g.queue.push_back(entry);
        true
    }

    pub fn drain(&self) -> Vec<PendingEntry> {
        let mut g = self.inner.lock();
        g.members.clear();
        g.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ReactionKey) -> bool {
        self.inner.lock().members.contains(key)
    }

    /// Events with at least one queued key.
    pub fn event_ids(&self) -> HashSet<Uuid> {
        self.inner.lock().queue.iter().map(|e| e.key.event_id).collect()
    }
}
