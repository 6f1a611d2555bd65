use std::collections::HashMap;

use corelib::{ReactionKey, WindowReaction};
use parking_lot::RwLock;
use uuid::Uuid;

/// Resolved reactions, at most one per (event, ticker, window).
#[derive(Default)]
pub struct ReactionStore {
    inner: RwLock<HashMap<Uuid, HashMap<(String, String), WindowReaction>>>,
}

impl ReactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ReactionKey) -> Option<WindowReaction> {
        self.inner
            .read()
            .get(&key.event_id)?
            .get(&(key.ticker.clone(), key.window.clone()))
            .cloned()
    }

    pub fn contains(&self, key: &ReactionKey) -> bool {
        self.inner
            .read()
            .get(&key.event_id)
            .is_some_and(|m| m.contains_key(&(key.ticker.clone(), key.window.clone())))
    }

    /// Stores `reaction` unless one exists for its key. Returns the stored
    /// reaction and whether it was newly inserted.
    pub fn insert_if_absent(&self, reaction: WindowReaction) -> (WindowReaction, bool) {
        let mut g = self.inner.write();
        let per_event = g.entry(reaction.event_id).or_default();
        let k = (reaction.ticker.clone(), reaction.window.clone());
        if let Some(existing) = per_event.get(&k) {
            return (existing.clone(), false);
        }
        per_event.insert(k, reaction.clone());
        (reaction, true)
    }

    #[cfg(test)]
    pub fn count(&self, event_id: &Uuid) -> usize {
        self.inner.read().get(event_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Drops every reaction of an event. Returns how many were held.
    pub fn remove_event(&self, event_id: &Uuid) -> usize {
        self.inner.write().remove(event_id).map(|m| m.len()).unwrap_or(0)
    }
}
