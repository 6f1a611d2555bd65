//! Default tracked universe: US macro series from FRED and the cross-asset
//! basket whose reaction is measured.
//!
//! Release times are fixed UTC slots (08:30 ET outside daylight saving);
//! they only timestamp date-only observations.
//!
//! FRED carries no consensus. Its forecast is the last print plus the last
//! change (see [`crate::feeds::fred`]), so a surprise is an acceleration or
//! slowdown, not the trend itself.

use chrono::NaiveTime;
use corelib::{
    Asset, AssetClass, DataSource, Direction, DirectionalBias, ImpactTier, Indicator,
    ReleaseFrequency,
};

use Direction::{Down, Up};

fn at(h: u32, m: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0)
}

fn fred(
    code: &str,
    name: &str,
    frequency: ReleaseFrequency,
    impact: ImpactTier,
    typical_release: &str,
    release_time_utc: Option<NaiveTime>,
    bias: DirectionalBias,
) -> Indicator {
    let mut ind = Indicator::new(code, name, frequency, impact);
    ind.typical_release = typical_release.to_string();
    ind.release_time_utc = release_time_utc;
    ind.source = DataSource::Fred;
    ind.bias = bias;
    ind
}

/// Direction each asset is expected to move on a stronger-than-forecast print
/// of a growth-style series (payrolls, sentiment, production).
fn growth_bias() -> DirectionalBias {
    DirectionalBias::default()
        .with_class(AssetClass::Equities, Up)
        .with_class(AssetClass::Rates, Up)
        .with_class(AssetClass::Fx, Down)
        .with_class(AssetClass::Volatility, Down)
}

/// Higher-is-worse series (unemployment, claims).
fn slack_bias() -> DirectionalBias {
    DirectionalBias::default()
        .with_class(AssetClass::Equities, Down)
        .with_class(AssetClass::Rates, Down)
        .with_class(AssetClass::Fx, Up)
        .with_class(AssetClass::Volatility, Up)
}

fn inflation_bias() -> DirectionalBias {
    DirectionalBias::default()
        .with_class(AssetClass::Equities, Down)
        .with_class(AssetClass::Rates, Up)
        .with_class(AssetClass::Fx, Down)
        .with_class(AssetClass::Volatility, Up)
}

pub fn default_indicators() -> Vec<Indicator> {
    use ImpactTier::*;
    use ReleaseFrequency::*;

    vec![
        fred(
            "CPIAUCSL",
            "Consumer Price Index (CPI)",
            Monthly,
            High,
            "Second week of month, 8:30 AM ET",
            at(13, 30),
            inflation_bias(),
        ),
        fred(
            "PAYEMS",
            "Non-Farm Payroll (NFP) - Total Employment",
            Monthly,
            VeryHigh,
            "First Friday of month, 8:30 AM ET",
            at(13, 30),
            growth_bias(),
        ),
        fred(
            "UNRATE",
            "Unemployment Rate",
            Monthly,
            High,
            "First Friday of month, 8:30 AM ET",
            at(13, 30),
            slack_bias(),
        ),
        fred(
            "UMCSENT",
            "University of Michigan Consumer Sentiment",
            Monthly,
            Medium,
            "Mid-month and end-of-month",
            at(15, 0),
            growth_bias(),
        ),
        fred(
            "INDPRO",
            "Industrial Production",
            Monthly,
            Medium,
            "Mid-month, 9:15 AM ET",
            at(14, 15),
            growth_bias(),
        ),
        fred(
            "ICSA",
            "Initial Jobless Claims",
            Weekly,
            Medium,
            "Every Thursday, 8:30 AM ET",
            at(13, 30),
            slack_bias(),
        ),
        // curve spread has no conventional directional read
        fred(
            "T10Y2Y",
            "10-Year / 2-Year Treasury Spread",
            Daily,
            Medium,
            "Daily at close",
            at(21, 0),
            DirectionalBias::default(),
        ),
    ]
}

pub fn default_assets() -> Vec<Asset> {
    use AssetClass::*;

    [
        ("SPY", Equities),
        ("QQQ", Equities),
        ("IWM", Equities),
        ("DIA", Equities),
        ("EURUSD=X", Fx),
        ("GBPUSD=X", Fx),
        ("JPYUSD=X", Fx),
        ("TNX", Rates),
        ("^TNX", Rates),
        ("^VIX", Volatility),
    ]
    .into_iter()
    .map(|(t, c)| Asset::new(t, c))
    .collect()
}
