use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Equities,
    Fx,
    Rates,
    Volatility,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetClass::Equities => "equities",
            AssetClass::Fx => "fx",
            AssetClass::Rates => "rates",
            AssetClass::Volatility => "volatility",
        };
        f.write_str(s)
    }
}

/// Monitored instrument, identified by its ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub ticker: String,
    pub class: AssetClass,
}

impl Asset {
    pub fn new(ticker: impl Into<String>, class: AssetClass) -> Self {
        Self {
            ticker: ticker.into(),
            class,
        }
    }
}

/// One price observation from the price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub ticker: String,
    pub at: DateTime<Utc>,
    pub price: f64,
}

impl PriceSnapshot {
    pub fn new(ticker: impl Into<String>, at: DateTime<Utc>, price: f64) -> Self {
        Self {
            ticker: ticker.into(),
            at,
            price,
        }
    }
}
