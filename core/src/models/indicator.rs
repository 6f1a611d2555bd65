use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::asset::{Asset, AssetClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// Qualitative market impact of an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImpactTier {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "VERY HIGH")]
    VeryHigh,
}

impl fmt::Display for ImpactTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactTier::Low => "LOW",
            ImpactTier::Medium => "MEDIUM",
            ImpactTier::High => "HIGH",
            ImpactTier::VeryHigh => "VERY HIGH",
        };
        f.write_str(s)
    }
}

/// Upstream feed an indicator is sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Fred,
    TradingEconomics,
}

/// Direction an asset is conventionally expected to move on a *positive* surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

/// Indicator-specific directional-correlation metadata.
///
/// Ticker entries override class entries. Assets with neither are "unmapped".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionalBias {
    #[serde(default)]
    pub by_class: BTreeMap<AssetClass, Direction>,
    #[serde(default)]
    pub by_ticker: BTreeMap<String, Direction>,
}

impl DirectionalBias {
    pub fn with_class(mut self, class: AssetClass, dir: Direction) -> Self {
        self.by_class.insert(class, dir);
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>, dir: Direction) -> Self {
        self.by_ticker.insert(ticker.into(), dir);
        self
    }

    pub fn expected(&self, asset: &Asset) -> Option<Direction> {
        self.by_ticker
            .get(&asset.ticker)
            .or_else(|| self.by_class.get(&asset.class))
            .copied()
    }
}

/// Tracked macro series. Reference data, never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// Stable series code, e.g. `PAYEMS`.
    pub code: String,
    pub name: String,
    pub frequency: ReleaseFrequency,
    pub impact: ImpactTier,
    /// Human description of the usual release slot.
    pub typical_release: String,
    /// Release time of day (UTC) used to timestamp date-only observations.
    #[serde(default)]
    pub release_time_utc: Option<NaiveTime>,
    #[serde(default)]
    pub source: DataSource,
    /// Symbol used by the upstream feed when it differs from `code`.
    #[serde(default)]
    pub source_symbol: Option<String>,
    #[serde(default)]
    pub bias: DirectionalBias,
}

impl Indicator {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        frequency: ReleaseFrequency,
        impact: ImpactTier,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            frequency,
            impact,
            typical_release: String::new(),
            release_time_utc: None,
            source: DataSource::Fred,
            source_symbol: None,
            bias: DirectionalBias::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        self.source_symbol.as_deref().unwrap_or(&self.code)
    }
}
