use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::release::{Release, ReleaseKey};
use super::surprise::SurpriseResult;

/// A significant surprise. Anchors all reaction sampling. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub indicator: String,
    pub release: Release,
    pub surprise: SurpriseResult,
    /// Release timestamp; window targets are offsets from here.
    pub anchor: DateTime<Utc>,
    /// Arrived beyond the reorder window and was processed out of order.
    pub late: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(release: Release, surprise: SurpriseResult, late: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            indicator: release.indicator.clone(),
            anchor: release.released_at,
            release,
            surprise,
            late,
            created_at: now,
        }
    }

    pub fn key(&self) -> ReleaseKey {
        self.release.key()
    }
}
