//! Tracker configuration.
//!
//! Supplied by the caller and passed explicitly into [`crate::Engine::new`].
//! Swapping it at runtime (`Engine::reconfigure`) is how indicators and
//! assets are added or removed.

use std::collections::HashSet;

use chrono::Duration;
use corelib::{Asset, Indicator, WindowSpec};

use crate::error::{EngineError, Result};

/// Significance policy for the surprise calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct SurprisePolicy {
    /// `|score|` must exceed this many standard deviations.
    pub threshold_std: f64,
    /// `|actual - forecast| / |forecast|` must exceed this percentage.
    pub min_magnitude_pct: f64,
    /// Prior releases (with forecast) needed before a std is trusted.
    pub min_history: usize,
    /// Use only the most recent N prior surprises; `None` uses all.
    pub std_lookback: Option<usize>,
}

impl Default for SurprisePolicy {
    fn default() -> Self {
        Self {
            threshold_std: 0.5,
            min_magnitude_pct: 0.1,
            min_history: 2,
            std_lookback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingPolicy {
    /// Cadence of the upstream price feed.
    pub price_interval: Duration,
    /// Max distance between a window target and the snapshot used for it.
    /// Defaults to half of `price_interval`.
    pub tolerance: Option<Duration>,
}

impl SamplingPolicy {
    pub fn tolerance(&self) -> Duration {
        self.tolerance.unwrap_or(self.price_interval / 2)
    }
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            price_interval: Duration::minutes(5),
            tolerance: None,
        }
    }
}

/// Baseline window plus the post-event horizons measured against it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSet {
    pub baseline: WindowSpec,
    pub horizons: Vec<WindowSpec>,
}

impl WindowSet {
    /// Baseline first, then horizons in configured order.
    pub fn all(&self) -> impl Iterator<Item = &WindowSpec> {
        std::iter::once(&self.baseline).chain(self.horizons.iter())
    }

    pub fn find(&self, name: &str) -> Option<&WindowSpec> {
        self.all().find(|w| w.name == name)
    }

    pub fn is_baseline(&self, name: &str) -> bool {
        self.baseline.name == name
    }

    pub fn len(&self) -> usize {
        1 + self.horizons.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Largest offset of any window; bounds how long an event stays pending.
    pub fn longest(&self) -> Duration {
        let max = self.all().map(|w| w.offset_minutes).max().unwrap_or(0);
        Duration::minutes(max.max(0))
    }
}

impl Default for WindowSet {
    fn default() -> Self {
        Self {
            baseline: WindowSpec::new("pre_event", -30),
            horizons: vec![
                WindowSpec::new("immediate", 60),
                WindowSpec::new("short_term", 240),
                WindowSpec::new("long_term", 1440),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub indicators: Vec<Indicator>,
    pub assets: Vec<Asset>,
    pub windows: WindowSet,
    pub surprise: SurprisePolicy,
    pub sampling: SamplingPolicy,
    /// How long a release is held for reordering after it arrives.
    pub lateness: Duration,
    /// Upper bound on queued (event, asset, window) keys.
    pub pending_capacity: usize,
    /// Extra time past the longest window before a pending key is abandoned.
    pub pending_grace: Duration,
}

impl TrackerConfig {
    pub fn new(indicators: Vec<Indicator>, assets: Vec<Asset>) -> Self {
        Self {
            indicators,
            assets,
            windows: WindowSet::default(),
            surprise: SurprisePolicy::default(),
            sampling: SamplingPolicy::default(),
            lateness: Duration::minutes(5),
            pending_capacity: 50_000,
            pending_grace: Duration::hours(6),
        }
    }

    pub fn indicator(&self, code: &str) -> Option<&Indicator> {
        self.indicators.iter().find(|i| i.code == code)
    }

    pub fn asset(&self, ticker: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.ticker == ticker)
    }

    /// Same as [`Self::indicator`], but an unknown code is a configuration error.
    pub fn require_indicator(&self, code: &str) -> Result<&Indicator> {
        self.indicator(code)
            .ok_or_else(|| EngineError::UnknownIndicator(code.to_string()))
    }

    pub fn require_asset(&self, ticker: &str) -> Result<&Asset> {
        self.asset(ticker)
            .ok_or_else(|| EngineError::UnknownAsset(ticker.to_string()))
    }

    /// How far back price history must reach for any still-pending event.
    pub fn price_retention(&self) -> Duration {
        let back = Duration::minutes(-self.windows.baseline.offset_minutes.min(0));
        self.windows.longest() + self.pending_grace + back + self.sampling.tolerance()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        let mut codes = HashSet::new();
        for ind in &self.indicators {
            if ind.code.trim().is_empty() {
                return invalid("indicator code must not be empty".into());
            }
            if !codes.insert(ind.code.as_str()) {
                return invalid(format!("duplicate indicator: {}", ind.code));
            }
        }

        let mut tickers = HashSet::new();
        for asset in &self.assets {
            if asset.ticker.trim().is_empty() {
                return invalid("asset ticker must not be empty".into());
            }
            if !tickers.insert(asset.ticker.as_str()) {
                return invalid(format!("duplicate asset: {}", asset.ticker));
            }
        }

        let mut names = HashSet::new();
        for w in self.windows.all() {
            if !names.insert(w.name.as_str()) {
                return invalid(format!("duplicate window: {}", w.name));
            }
        }
        if let Some(w) = self
            .windows
            .horizons
            .iter()
            .find(|w| w.offset_minutes <= self.windows.baseline.offset_minutes)
        {
            return invalid(format!(
                "window {} must be later than baseline {}",
                w.name, self.windows.baseline.name
            ));
        }

        let p = &self.surprise;
        if !p.threshold_std.is_finite() || p.threshold_std < 0.0 {
            return invalid(format!("threshold_std must be >= 0, got {}", p.threshold_std));
        }
        if !p.min_magnitude_pct.is_finite() || p.min_magnitude_pct < 0.0 {
            return invalid(format!(
                "min_magnitude_pct must be >= 0, got {}",
                p.min_magnitude_pct
            ));
        }
        if p.min_history < 2 {
            return invalid("min_history must be at least 2".into());
        }
        if p.std_lookback.is_some_and(|n| n < p.min_history) {
            return invalid("std_lookback must not be smaller than min_history".into());
        }

        if self.sampling.price_interval <= Duration::zero() {
            return invalid("price_interval must be positive".into());
        }
        if self.sampling.tolerance() < Duration::zero() {
            return invalid("sampling tolerance must not be negative".into());
        }
        if self.lateness < Duration::zero() {
            return invalid("lateness must not be negative".into());
        }
        if self.pending_capacity == 0 {
            return invalid("pending_capacity must be positive".into());
        }

        Ok(())
    }
}
