use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation of an indicator. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub indicator: String,
    pub actual: f64,
    pub forecast: Option<f64>,
    /// Rolling std of past surprises when the feed supplies one.
    #[serde(default)]
    pub surprise_std: Option<f64>,
    pub released_at: DateTime<Utc>,
}

/// De-duplication key: one release per indicator per timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseKey {
    pub indicator: String,
    pub released_at: DateTime<Utc>,
}

impl Release {
    pub fn new(
        indicator: impl Into<String>,
        actual: f64,
        forecast: Option<f64>,
        released_at: DateTime<Utc>,
    ) -> Self {
        Self {
            indicator: indicator.into(),
            actual,
            forecast,
            surprise_std: None,
            released_at,
        }
    }

    pub fn key(&self) -> ReleaseKey {
        ReleaseKey {
            indicator: self.indicator.clone(),
            released_at: self.released_at,
        }
    }

    /// `actual - forecast`, when a forecast exists.
    pub fn surprise(&self) -> Option<f64> {
        self.forecast.map(|f| self.actual - f)
    }
}
