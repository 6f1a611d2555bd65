//! Event Detector.
//!
//! Turns incoming releases into events:
//! - de-duplicates on (indicator, release timestamp), so replays are no-ops;
//! - holds releases in a per-indicator reorder buffer for the lateness window
//!   and flushes them in timestamp order;
//! - anything older than an already processed release is flushed as-is and
//!   flagged `late`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use corelib::{Event, Indicator, Release, ReleaseKey, SurpriseResult};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SurprisePolicy;
use crate::history::{InsertOutcome, ReleaseStore};
use crate::surprise;

#[derive(Debug, Clone)]
struct Buffered {
    release: Release,
    arrived_at: DateTime<Utc>,
}

/// A release leaving the reorder buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyRelease {
    pub release: Release,
    pub late: bool,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub release: Release,
    pub surprise: SurpriseResult,
    pub late: bool,
    /// Set only when this call created the event.
    pub created: Option<Event>,
}

#[derive(Default)]
pub struct EventDetector {
    buffers: Mutex<HashMap<String, Vec<Buffered>>>,
    seen: Mutex<HashSet<ReleaseKey>>,
    watermarks: Mutex<HashMap<String, DateTime<Utc>>>,
    events: RwLock<HashMap<Uuid, Event>>,
    by_key: RwLock<HashMap<ReleaseKey, Uuid>>,
}

impl EventDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a validated release. Returns `false` for a replay.
    pub fn offer(&self, release: Release, now: DateTime<Utc>) -> bool {
        if !self.seen.lock().insert(release.key()) {
            debug!(indicator = %release.indicator, released_at = %release.released_at, "duplicate release ignored");
            return false;
        }
        self.buffers
            .lock()
            .entry(release.indicator.clone())
            .or_default()
            .push(Buffered {
                release,
                arrived_at: now,
            });
        true
    }

    /// Releases whose reorder window has passed, oldest first per indicator.
    pub fn flush_ready(&self, now: DateTime<Utc>, lateness: Duration) -> Vec<ReadyRelease> {
        let mut out = Vec::new();
        let mut buffers = self.buffers.lock();
        let mut watermarks = self.watermarks.lock();

        for (code, buf) in buffers.iter_mut() {
            let cutoff = buf
                .iter()
                .filter(|b| b.arrived_at + lateness <= now)
                .map(|b| b.release.released_at)
                .max();
            let Some(cutoff) = cutoff else {
                continue;
            };

            let (mut ready, keep): (Vec<_>, Vec<_>) = buf
                .drain(..)
                .partition(|b| b.release.released_at <= cutoff);
            *buf = keep;
            ready.sort_by_key(|b| b.release.released_at);

            for b in ready {
                let at = b.release.released_at;
                let late = watermarks.get(code).is_some_and(|wm| at < *wm);
                if late {
                    warn!(indicator = %code, released_at = %at, "release arrived beyond reorder window");
                }
                let wm = watermarks.entry(code.clone()).or_insert(at);
                if at > *wm {
                    *wm = at;
                }
                out.push(ReadyRelease {
                    release: b.release,
                    late,
                });
            }
        }

        buffers.retain(|_, buf| !buf.is_empty());
        out.sort_by(|a, b| {
            (a.release.released_at, &a.release.indicator)
                .cmp(&(b.release.released_at, &b.release.indicator))
        });
        out
    }

    /// Inserts the release into history, evaluates it, and creates an event
    /// when the surprise is significant and no event exists for its key.
    pub fn detect(
        &self,
        indicator: &Indicator,
        ready: ReadyRelease,
        history: &ReleaseStore,
        policy: &SurprisePolicy,
        now: DateTime<Utc>,
    ) -> Detection {
        let ReadyRelease { release, late } = ready;

        if history.insert(release.clone()) == InsertOutcome::Duplicate {
            debug!(indicator = %indicator.code, "release already in history");
        }

        let prior = history.prior(&indicator.code, release.released_at);
        let result = surprise::evaluate(indicator, &release, &prior, policy);

        let created = if result.significant {
            self.register(Event::new(release.clone(), result.clone(), late, now))
        } else {
            None
        };

        if let Some(ev) = &created {
            info!(
                indicator = %indicator.code,
                event_id = %ev.id,
                score = ?result.score,
                late,
                "significant surprise; event created"
            );
        }

        Detection {
            release,
            surprise: result,
            late,
            created,
        }
    }

    /// Registers `event` unless its release key already has one.
    fn register(&self, event: Event) -> Option<Event> {
        let key = event.key();
        let mut by_key = self.by_key.write();
        if by_key.contains_key(&key) {
            return None;
        }
        by_key.insert(key, event.id);
        self.events.write().insert(event.id, event.clone());
        Some(event)
    }

    /// Recovery: a release already in persisted history.
    pub fn mark_processed(&self, release: &Release) {
        self.seen.lock().insert(release.key());
        let mut wm = self.watermarks.lock();
        let entry = wm
            .entry(release.indicator.clone())
            .or_insert(release.released_at);
        if release.released_at > *entry {
            *entry = release.released_at;
        }
    }

    /// Recovery: an event already persisted.
    pub fn restore_event(&self, event: Event) {
        self.seen.lock().insert(event.key());
        self.register(event);
    }

    pub fn event(&self, id: &Uuid) -> Option<Event> {
        self.events.read().get(id).cloned()
    }

    pub fn event_ids(&self) -> Vec<Uuid> {
        self.events.read().keys().copied().collect()
    }

    /// Forgets a settled event. Its release key stays registered, so the
    /// release can never create a second event.
    pub fn evict(&self, id: &Uuid) -> Option<Event> {
        self.events.write().remove(id)
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn buffered(&self) -> usize {
        self.buffers.lock().values().map(Vec::len).sum()
    }

    /// Drops buffered releases of an indicator that is no longer tracked.
    pub fn forget_indicator(&self, code: &str) -> usize {
        let dropped = self
            .buffers
            .lock()
            .remove(code)
            .map(|b| b.len())
            .unwrap_or(0);
        if dropped > 0 {
            info!(indicator = %code, dropped, "indicator untracked; buffered releases abandoned");
        }
        dropped
    }
}
