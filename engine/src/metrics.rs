use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility. Does not affect behavior.
#[derive(Clone, Default)]
pub struct Counters {
    pub releases_ingested: Arc<AtomicU64>,
    pub releases_duplicate: Arc<AtomicU64>,
    pub releases_rejected: Arc<AtomicU64>,
    pub releases_late: Arc<AtomicU64>,

    pub prices_ingested: Arc<AtomicU64>,
    pub prices_rejected: Arc<AtomicU64>,
    pub prices_backfilled: Arc<AtomicU64>,

    pub events_created: Arc<AtomicU64>,
    pub reactions_resolved: Arc<AtomicU64>,

    // pending-set outcomes
    pub pending_abandoned: Arc<AtomicU64>,
    pub pending_expired: Arc<AtomicU64>,
    pub pending_dropped_full: Arc<AtomicU64>,

    pub alerts_sent: Arc<AtomicU64>,
    pub reports_sent: Arc<AtomicU64>,
    pub delivery_failures: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub releases_ingested: u64,
    pub releases_duplicate: u64,
    pub releases_rejected: u64,
    pub releases_late: u64,
    pub prices_ingested: u64,
    pub prices_rejected: u64,
    pub prices_backfilled: u64,
    pub events_created: u64,
    pub reactions_resolved: u64,
    pub pending_abandoned: u64,
    pub pending_expired: u64,
    pub pending_dropped_full: u64,
    pub alerts_sent: u64,
    pub reports_sent: u64,
    pub delivery_failures: u64,
}

pub(crate) fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn add(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            releases_ingested: get(&self.releases_ingested),
            releases_duplicate: get(&self.releases_duplicate),
            releases_rejected: get(&self.releases_rejected),
            releases_late: get(&self.releases_late),
            prices_ingested: get(&self.prices_ingested),
            prices_rejected: get(&self.prices_rejected),
            prices_backfilled: get(&self.prices_backfilled),
            events_created: get(&self.events_created),
            reactions_resolved: get(&self.reactions_resolved),
            pending_abandoned: get(&self.pending_abandoned),
            pending_expired: get(&self.pending_expired),
            pending_dropped_full: get(&self.pending_dropped_full),
            alerts_sent: get(&self.alerts_sent),
            reports_sent: get(&self.reports_sent),
            delivery_failures: get(&self.delivery_failures),
        }
    }
}
