//! Price Snapshot Store.
//!
//! Per-ticker time-ordered series. Live feed appends must move forward in
//! time; backfilled snapshots (fetched for a past window target) may land
//! anywhere. Neither ever overwrites an existing point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use corelib::PriceSnapshot;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    /// Timestamp already present; the stored price is kept.
    Duplicate,
}

#[derive(Default)]
struct Series {
    points: BTreeMap<DateTime<Utc>, f64>,
    last_live: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct PriceStore {
    inner: RwLock<HashMap<String, Arc<RwLock<Series>>>>,
}

/// Rejects NaN, infinite, zero and negative prices.
pub fn validate_snapshot(snap: &PriceSnapshot) -> Result<()> {
    if snap.ticker.trim().is_empty() {
        return Err(EngineError::Malformed("price snapshot without ticker".into()));
    }
    if !snap.price.is_finite() || snap.price <= 0.0 {
        return Err(EngineError::Malformed(format!(
            "{} price {} at {} is not a positive number",
            snap.ticker, snap.price, snap.at
        )));
    }
    Ok(())
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn series(&self, ticker: &str) -> Arc<RwLock<Series>> {
        if let Some(s) = self.inner.read().get(ticker) {
            return Arc::clone(s);
        }
        Arc::clone(self.inner.write().entry(ticker.to_string()).or_default())
    }

    fn existing(&self, ticker: &str) -> Option<Arc<RwLock<Series>>> {
        self.inner.read().get(ticker).cloned()
    }

    /// Append from the live feed. A timestamp that does not move forward is
    /// rejected unless it repeats the last snapshot exactly.
    pub fn append(&self, snap: &PriceSnapshot) -> Result<AppendOutcome> {
        validate_snapshot(snap)?;

        let series = self.series(&snap.ticker);
        let mut s = series.write();

        if let Some(last) = s.last_live {
            if snap.at <= last {
                if s.points.get(&snap.at) == Some(&snap.price) {
                    return Ok(AppendOutcome::Duplicate);
                }
                return Err(EngineError::Malformed(format!(
                    "{} snapshot at {} is not after last live snapshot {}",
                    snap.ticker, snap.at, last
                )));
            }
        }

        s.last_live = Some(snap.at);
        if let Some(existing) = s.points.get(&snap.at) {
            if *existing != snap.price {
                debug!(
                    ticker = %snap.ticker,
                    at = %snap.at,
                    kept = *existing,
                    offered = snap.price,
                    "live snapshot collides with a stored point; first value kept"
                );
            }
            return Ok(AppendOutcome::Duplicate);
        }
        s.points.insert(snap.at, snap.price);
        Ok(AppendOutcome::Stored)
    }

    /// Insert a historical snapshot if its timestamp is not yet known.
    pub fn backfill(&self, snap: &PriceSnapshot) -> Result<AppendOutcome> {
        validate_snapshot(snap)?;

        let series = self.series(&snap.ticker);
        let mut s = series.write();
        if s.points.contains_key(&snap.at) {
            return Ok(AppendOutcome::Duplicate);
        }
        s.points.insert(snap.at, snap.price);
        Ok(AppendOutcome::Stored)
    }

    /// Snapshot nearest to, but not after, `target`, no further back than `tolerance`.
    pub fn at_or_before(
        &self,
        ticker: &str,
        target: DateTime<Utc>,
        tolerance: Duration,
    ) -> Option<PriceSnapshot> {
        let series = self.existing(ticker)?;
        let s = series.read();
        let (at, price) = s.points.range(..=target).next_back()?;
        if target - *at > tolerance {
            return None;
        }
        Some(PriceSnapshot::new(ticker, *at, *price))
    }

    #[cfg(test)]
    pub fn len(&self, ticker: &str) -> usize {
        self.existing(ticker).map(|s| s.read().points.len()).unwrap_or(0)
    }

    /// Drops snapshots older than `cutoff` across all tickers. Returns how many.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let all: Vec<_> = self.inner.read().values().cloned().collect();
        let mut removed = 0;
        for series in all {
            let mut s = series.write();
            let keep = s.points.split_off(&cutoff);
            removed += s.points.len();
            s.points = keep;
        }
        removed
    }
}
