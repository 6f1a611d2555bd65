//! Indicator Release Store.
//!
//! One sorted, append-only history per indicator. Each history has its own
//! lock, so appends for different indicators never contend.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use corelib::Release;
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Newer than everything stored.
    Appended,
    /// Older than the newest entry; placed at its sorted position.
    Inserted,
    /// Same indicator and timestamp already stored.
    Duplicate,
}

type History = Arc<Mutex<Vec<Release>>>;

#[derive(Default)]
pub struct ReleaseStore {
    inner: RwLock<HashMap<String, History>>,
}

impl ReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, code: &str) -> History {
        if let Some(h) = self.inner.read().get(code) {
            return Arc::clone(h);
        }
        Arc::clone(self.inner.write().entry(code.to_string()).or_default())
    }

    fn existing(&self, code: &str) -> Option<History> {
        self.inner.read().get(code).cloned()
    }

    pub fn insert(&self, release: Release) -> InsertOutcome {
        let slot = self.slot(&release.indicator);
        let mut h = slot.lock();

        match h.last() {
            None => {
                h.push(release);
                InsertOutcome::Appended
            }
            Some(last) if last.released_at < release.released_at => {
                h.push(release);
                InsertOutcome::Appended
            }
            _ => match h.binary_search_by_key(&release.released_at, |r| r.released_at) {
                Ok(_) => InsertOutcome::Duplicate,
                Err(pos) => {
                    h.insert(pos, release);
                    InsertOutcome::Inserted
                }
            },
        }
    }

    /// Releases strictly earlier than `before`, oldest first.
    pub fn prior(&self, code: &str, before: DateTime<Utc>) -> Vec<Release> {
        let Some(slot) = self.existing(code) else {
            return Vec::new();
        };
        let h = slot.lock();
        let end = h.partition_point(|r| r.released_at < before);
        h[..end].to_vec()
    }

    pub fn history(&self, code: &str) -> Vec<Release> {
        self.existing(code)
            .map(|slot| slot.lock().clone())
            .unwrap_or_default()
    }
}
