//! Surprise Calculator.
//!
//! Pure function over a release, the indicator's prior history and the
//! significance policy. A release only fires when *both* the standardized
//! score and the percentage magnitude clear their thresholds.

use corelib::{Indicator, NoSignalReason, Release, SurpriseDirection, SurpriseResult, Verdict};
use tracing::debug;

use crate::config::SurprisePolicy;

/// Below this a std (or forecast) is treated as zero.
const EPSILON: f64 = 1e-12;

/// Sample standard deviation (n - 1). `None` for fewer than two points.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(var.sqrt())
}

/// Surprises of releases strictly before `release`, oldest first, limited to
/// the policy lookback.
pub fn prior_surprises(release: &Release, history: &[Release], policy: &SurprisePolicy) -> Vec<f64> {
    let mut points: Vec<f64> = history
        .iter()
        .filter(|r| r.released_at < release.released_at)
        .filter_map(Release::surprise)
        .filter(|s| s.is_finite())
        .collect();

    if let Some(n) = policy.std_lookback {
        if points.len() > n {
            points.drain(..points.len() - n);
        }
    }
    points
}

pub fn evaluate(
    indicator: &Indicator,
    release: &Release,
    history: &[Release],
    policy: &SurprisePolicy,
) -> SurpriseResult {
    let Some(forecast) = release.forecast else {
        debug!(indicator = %indicator.code, "no forecast; surprise undefined");
        return SurpriseResult::no_signal(NoSignalReason::MissingForecast, None, 0);
    };

    let surprise = release.actual - forecast;
    let points = prior_surprises(release, history, policy);
    let have = points.len();

    // a feed-supplied std only replaces the computed one, never missing history
    let std = if have >= policy.min_history {
        release
            .surprise_std
            .filter(|s| s.is_finite() && *s > 0.0)
            .or_else(|| sample_std(&points))
    } else {
        None
    };

    let Some(std) = std else {
        debug!(
            indicator = %indicator.code,
            have,
            need = policy.min_history,
            "insufficient history for surprise std"
        );
        return SurpriseResult::no_signal(
            NoSignalReason::InsufficientHistory {
                have,
                need: policy.min_history,
            },
            Some(surprise),
            have,
        );
    };

    if !std.is_finite() || std <= EPSILON {
        return SurpriseResult::no_signal(NoSignalReason::DegenerateStd, Some(surprise), have);
    }

    let score = surprise / std;
    let magnitude = surprise.abs();
    let magnitude_pct = (forecast.abs() > EPSILON).then(|| magnitude / forecast.abs() * 100.0);

    let significant = score.abs() > policy.threshold_std
        && magnitude_pct.is_some_and(|m| m > policy.min_magnitude_pct);

    debug!(
        indicator = %indicator.code,
        score,
        std,
        magnitude_pct = ?magnitude_pct,
        significant,
        "surprise evaluated"
    );

    SurpriseResult {
        score: Some(score),
        surprise: Some(surprise),
        magnitude: Some(magnitude),
        magnitude_pct,
        std: Some(std),
        history_len: have,
        direction: Some(SurpriseDirection::from_value(surprise)),
        verdict: if significant {
            Verdict::Significant
        } else {
            Verdict::BelowThreshold
        },
        significant,
    }
}
