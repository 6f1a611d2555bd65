//! Persistence seam.
//!
//! Append-only and idempotent: writing a record whose key already exists is
//! a no-op, so replays after a restart never duplicate anything.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corelib::{Event, PriceSnapshot, ReactionKey, Release, ReleaseKey, WindowReaction};
use parking_lot::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn append_release(&self, release: &Release) -> Result<()>;

    async fn append_price(&self, snap: &PriceSnapshot) -> Result<()>;

    async fn insert_event(&self, event: &Event) -> Result<()>;

    async fn insert_reaction(&self, reaction: &WindowReaction) -> Result<()>;

    /// Releases of one indicator, oldest first.
    async fn load_releases(&self, indicator: &str) -> Result<Vec<Release>>;

    /// Snapshots of one ticker with `from <= at <= to`, oldest first.
    async fn load_prices(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceSnapshot>>;

    /// Events anchored at or after `since`, oldest first.
    async fn load_events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>>;

    async fn load_event(&self, event_id: &Uuid) -> Result<Option<Event>>;

    async fn load_reactions(&self, event_id: &Uuid) -> Result<Vec<WindowReaction>>;
}

#[derive(Default)]
struct Tables {
    releases: HashMap<String, BTreeMap<DateTime<Utc>, Release>>,
    prices: HashMap<String, BTreeMap<DateTime<Utc>, PriceSnapshot>>,
    events: HashMap<Uuid, Event>,
    event_keys: HashMap<ReleaseKey, Uuid>,
    reactions: HashMap<ReactionKey, WindowReaction>,
}

/// In-process repository for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.tables.read().events.len()
    }

    pub fn reaction_count(&self) -> usize {
        self.tables.read().reactions.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn append_release(&self, release: &Release) -> Result<()> {
        self.tables
            .write()
            .releases
            .entry(release.indicator.clone())
            .or_default()
            .entry(release.released_at)
            .or_insert_with(|| release.clone());
        Ok(())
    }

    async fn append_price(&self, snap: &PriceSnapshot) -> Result<()> {
        self.tables
            .write()
            .prices
            .entry(snap.ticker.clone())
            .or_default()
            .entry(snap.at)
            .or_insert_with(|| snap.clone());
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> Result<()> {
        let mut t = self.tables.write();
        if t.event_keys.contains_key(&event.key()) {
            return Ok(());
        }
        t.event_keys.insert(event.key(), event.id);
        t.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn insert_reaction(&self, reaction: &WindowReaction) -> Result<()> {
        self.tables
            .write()
            .reactions
            .entry(reaction.key())
            .or_insert_with(|| reaction.clone());
        Ok(())
    }

    async fn load_releases(&self, indicator: &str) -> Result<Vec<Release>> {
        Ok(self
            .tables
            .read()
            .releases
            .get(indicator)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_prices(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceSnapshot>> {
        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .read()
            .prices
            .get(ticker)
            .map(|m| m.range(from..=to).map(|(_, s)| s.clone()).collect())
            .unwrap_or_default())
    }

    async fn load_events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut out: Vec<Event> = self
            .tables
            .read()
            .events
            .values()
            .filter(|e| e.anchor >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.anchor, &a.indicator).cmp(&(b.anchor, &b.indicator)));
        Ok(out)
    }

    async fn load_event(&self, event_id: &Uuid) -> Result<Option<Event>> {
        Ok(self.tables.read().events.get(event_id).cloned())
    }

    async fn load_reactions(&self, event_id: &Uuid) -> Result<Vec<WindowReaction>> {
        let mut out: Vec<WindowReaction> = self
            .tables
            .read()
            .reactions
            .values()
            .filter(|r| &r.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.ticker, a.target_at).cmp(&(&b.ticker, b.target_at)));
        Ok(out)
    }
}
