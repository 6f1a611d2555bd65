use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named sampling offset, in minutes from the event anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub offset_minutes: i64,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, offset_minutes: i64) -> Self {
        Self {
            name: name.into(),
            offset_minutes,
        }
    }

    pub fn target(&self, anchor: DateTime<Utc>) -> DateTime<Utc> {
        anchor + Duration::minutes(self.offset_minutes)
    }
}

/// Identity of one (event, asset, window) measurement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionKey {
    pub event_id: Uuid,
    pub ticker: String,
    pub window: String,
}

impl ReactionKey {
    pub fn new(event_id: Uuid, ticker: impl Into<String>, window: impl Into<String>) -> Self {
        Self {
            event_id,
            ticker: ticker.into(),
            window: window.into(),
        }
    }
}

/// Resolved price reaction of one asset over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReaction {
    pub event_id: Uuid,
    pub ticker: String,
    pub window: String,
    pub target_at: DateTime<Utc>,
    /// Timestamp of the snapshot actually used.
    pub sampled_at: DateTime<Utc>,
    pub baseline_price: f64,
    pub post_price: f64,
    /// Percent change from baseline; `None` when the baseline is not positive.
    pub return_pct: Option<f64>,
}

impl WindowReaction {
    pub fn key(&self) -> ReactionKey {
        ReactionKey::new(self.event_id, self.ticker.clone(), self.window.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    /// Target timestamp is still in the future.
    NotElapsed,
    /// No snapshot within tolerance at or before the target.
    NoSnapshot,
    /// Baseline window is unresolved.
    BaselinePending,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn negative_offsets_target_before_anchor() {
        let anchor = Utc.with_ymd_and_hms(2024, 3, 8, 13, 30, 0).unwrap();
        let pre = WindowSpec::new("pre_event", -30);
        let long = WindowSpec::new("long_term", 1440);

        assert_eq!(
            pre.target(anchor),
            Utc.with_ymd_and_hms(2024, 3, 8, 13, 0, 0).unwrap()
        );
        assert_eq!(
            long.target(anchor),
            Utc.with_ymd_and_hms(2024, 3, 9, 13, 30, 0).unwrap()
        );
    }
}
