use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum NoSignalReason {
    MissingForecast,
    InsufficientHistory { have: usize, need: usize },
    DegenerateStd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Verdict {
    Significant,
    BelowThreshold,
    NoSignal(NoSignalReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurpriseDirection {
    Positive,
    Negative,
    Flat,
}

impl SurpriseDirection {
    pub fn from_value(v: f64) -> Self {
        if v > 0.0 {
            SurpriseDirection::Positive
        } else if v < 0.0 {
            SurpriseDirection::Negative
        } else {
            SurpriseDirection::Flat
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            SurpriseDirection::Positive => 1.0,
            SurpriseDirection::Negative => -1.0,
            SurpriseDirection::Flat => 0.0,
        }
    }
}

/// Standardized surprise of one release. Derived, never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurpriseResult {
    /// `(actual - forecast) / std`; `None` when forecast or std is unavailable.
    pub score: Option<f64>,
    /// `actual - forecast`.
    pub surprise: Option<f64>,
    /// `|actual - forecast|`.
    pub magnitude: Option<f64>,
    /// Magnitude as a percentage of `|forecast|`.
    pub magnitude_pct: Option<f64>,
    /// Std of past surprises used for the score.
    pub std: Option<f64>,
    /// Number of prior releases the std was derived from.
    pub history_len: usize,
    pub direction: Option<SurpriseDirection>,
    pub verdict: Verdict,
    pub significant: bool,
}

impl SurpriseResult {
    pub fn no_signal(reason: NoSignalReason, surprise: Option<f64>, history_len: usize) -> Self {
        Self {
            score: None,
            surprise,
            magnitude: surprise.map(f64::abs),
            magnitude_pct: None,
            std: None,
            history_len,
            direction: surprise.map(SurpriseDirection::from_value),
            verdict: Verdict::NoSignal(reason),
            significant: false,
        }
    }
}
