//! Reaction Aggregator.
//!
//! Builds a [`Report`] snapshot for one event from whatever is stored. It
//! never samples and never writes, so building twice from the same stores
//! yields identical reports.

use chrono::{DateTime, Utc};
use corelib::{
    Asset, AssetReactions, CellState, Event, Indicator, Report, ReportStatus, WindowAgreement,
    WindowCell,
};

use crate::config::WindowSet;
use crate::sampler::{ReactionSampler, Sample};

pub struct ReportBuilder<'a> {
    assets: &'a [Asset],
    windows: &'a WindowSet,
    sampler: &'a ReactionSampler<'a>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(assets: &'a [Asset], windows: &'a WindowSet, sampler: &'a ReactionSampler<'a>) -> Self {
        Self {
            assets,
            windows,
            sampler,
        }
    }

    pub fn build(&self, event: &Event, indicator: &Indicator, now: DateTime<Utc>) -> Report {
        let assets: Vec<AssetReactions> = self
            .assets
            .iter()
            .map(|asset| AssetReactions {
                ticker: asset.ticker.clone(),
                class: asset.class,
                windows: self
                    .windows
                    .all()
                    .map(|w| WindowCell {
                        window: w.name.clone(),
                        offset_minutes: w.offset_minutes,
                        state: match self.sampler.peek(event, asset, w, now) {
                            Sample::Resolved(reaction) => CellState::Resolved { reaction },
                            Sample::Pending(reason) => CellState::Pending { reason },
                        },
                    })
                    .collect(),
            })
            .collect();

        let status = if assets
            .iter()
            .flat_map(|a| a.windows.iter())
            .any(|c| c.state.is_pending())
        {
            ReportStatus::Partial
        } else {
            ReportStatus::Complete
        };

        let agreement = self
            .windows
            .horizons
            .iter()
            .map(|w| agreement_for(&w.name, event, indicator, self.assets, &assets))
            .collect();

        Report {
            event_id: event.id,
            indicator: event.indicator.clone(),
            indicator_name: indicator.name.clone(),
            released_at: event.release.released_at,
            actual: event.release.actual,
            forecast: event.release.forecast,
            surprise: event.surprise.clone(),
            late: event.late,
            status,
            assets,
            agreement,
        }
    }
}

/// Classifies each asset's resolved return in `window` against the
/// direction implied by the surprise sign and the indicator's bias.
fn agreement_for(
    window: &str,
    event: &Event,
    indicator: &Indicator,
    tracked: &[Asset],
    rows: &[AssetReactions],
) -> WindowAgreement {
    let mut out = WindowAgreement {
        window: window.to_string(),
        ..Default::default()
    };
    let surprise_sign = event.surprise.direction.map(|d| d.sign()).unwrap_or(0.0);

    for (asset, row) in tracked.iter().zip(rows) {
        let Some(dir) = indicator.bias.expected(asset) else {
            out.unmapped.push(asset.ticker.clone());
            continue;
        };
        let ret = row
            .windows
            .iter()
            .find(|c| c.window == window)
            .and_then(|c| match &c.state {
                CellState::Resolved { reaction } => reaction.return_pct,
                CellState::Pending { .. } => None,
            });
        let Some(ret) = ret else {
            continue;
        };

        let expected = surprise_sign * dir.sign();
        if ret == 0.0 || expected == 0.0 {
            out.flat.push(asset.ticker.clone());
        } else if ret.signum() == expected.signum() {
            out.agreeing.push(asset.ticker.clone());
        } else {
            out.disagreeing.push(asset.ticker.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use corelib::{
        AssetClass, Direction, DirectionalBias, ImpactTier, PendingReason, PriceSnapshot, Release,
        ReleaseFrequency, SurpriseDirection, SurpriseResult, Verdict,
    };

    use crate::prices::PriceStore;
    use crate::reactions::ReactionStore;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 13, 30, 0).unwrap()
    }

    fn payems() -> Indicator {
        let mut ind = Indicator::new(
            "PAYEMS",
            "Non-Farm Payroll",
            ReleaseFrequency::Monthly,
            ImpactTier::VeryHigh,
        );
        ind.bias = DirectionalBias::default()
            .with_class(AssetClass::Equities, Direction::Up)
            .with_class(AssetClass::Rates, Direction::Up)
            .with_ticker("^VIX", Direction::Down);
        ind
    }

    fn event() -> Event {
        let release = Release::new("PAYEMS", 250_000.0, Some(150_000.0), anchor());
        let surprise = SurpriseResult {
            score: Some(2.0),
            surprise: Some(100_000.0),
            magnitude: Some(100_000.0),
            magnitude_pct: Some(66.7),
            std: Some(50_000.0),
            history_len: 3,
            direction: Some(SurpriseDirection::Positive),
            verdict: Verdict::Significant,
            significant: true,
        };
        Event::new(release, surprise, false, anchor())
    }

    fn assets() -> Vec<Asset> {
        vec![
            Asset::new("SPY", AssetClass::Equities),
            Asset::new("^VIX", AssetClass::Volatility),
            Asset::new("EURUSD=X", AssetClass::Fx),
        ]
    }

    fn seed(prices: &PriceStore, ticker: &str, pre: f64, imm: f64) {
        for (off, p) in [(-30, pre), (60, imm)] {
            prices
                .backfill(&PriceSnapshot::new(
                    ticker,
                    anchor() + Duration::minutes(off),
                    p,
                ))
                .unwrap();
        }
    }

    fn sample_all(sampler: &ReactionSampler<'_>, windows: &WindowSet, ev: &Event, now: DateTime<Utc>) {
        for a in assets() {
            for w in windows.all() {
                sampler.sample(ev, &a, w, now);
            }
        }
    }

    #[test]
    fn partial_report_lists_cells_in_config_order() {
        let prices = PriceStore::new();
        let reactions = ReactionStore::new();
        let windows = WindowSet::default();
        seed(&prices, "SPY", 450.0, 452.25);

        let ev = event();
        let now = anchor() + Duration::minutes(65);
        let sampler = ReactionSampler::new(&prices, &reactions, &windows, Duration::seconds(150));
        sample_all(&sampler, &windows, &ev, now);

        let tracked = assets();
        let report = ReportBuilder::new(&tracked, &windows, &sampler).build(&ev, &payems(), now);

        assert_eq!(report.status, ReportStatus::Partial);
        let tickers: Vec<_> = report.assets.iter().map(|a| a.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["SPY", "^VIX", "EURUSD=X"]);
        let names: Vec<_> = report.assets[0].windows.iter().map(|c| c.window.as_str()).collect();
        assert_eq!(names, vec!["pre_event", "immediate", "short_term", "long_term"]);

        match &report.assets[0].windows[1].state {
            CellState::Resolved { reaction } => {
                assert!((reaction.return_pct.unwrap() - 0.5).abs() < 1e-9)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            report.assets[0].windows[2].state,
            CellState::Pending {
                reason: PendingReason::NotElapsed
            }
        );
        assert_eq!(
            report.assets[1].windows[0].state,
            CellState::Pending {
                reason: PendingReason::NoSnapshot
            }
        );
    }

    #[test]
    fn agreement_follows_surprise_sign_and_bias() {
        let prices = PriceStore::new();
        let reactions = ReactionStore::new();
        let windows = WindowSet::default();
        seed(&prices, "SPY", 450.0, 452.25);
        // vix is expected down on a positive surprise, but rose
        seed(&prices, "^VIX", 14.0, 15.0);
        seed(&prices, "EURUSD=X", 1.08, 1.07);

        let ev = event();
        let now = anchor() + Duration::minutes(65);
        let sampler = ReactionSampler::new(&prices, &reactions, &windows, Duration::seconds(150));
        sample_all(&sampler, &windows, &ev, now);

        let tracked = assets();
        let report = ReportBuilder::new(&tracked, &windows, &sampler).build(&ev, &payems(), now);

        assert_eq!(report.agreement.len(), 3);
        let imm = &report.agreement[0];
        assert_eq!(imm.window, "immediate");
        assert_eq!(imm.agreeing, vec!["SPY".to_string()]);
        assert_eq!(imm.disagreeing, vec!["^VIX".to_string()]);
        assert_eq!(imm.unmapped, vec!["EURUSD=X".to_string()]);
        assert!(imm.flat.is_empty());

        let short = &report.agreement[1];
        assert!(short.agreeing.is_empty() && short.disagreeing.is_empty());
    }

    #[test]
    fn building_twice_is_identical() {
        let prices = PriceStore::new();
        let reactions = ReactionStore::new();
        let windows = WindowSet::default();
        seed(&prices, "SPY", 450.0, 452.25);

        let ev = event();
        let now = anchor() + Duration::minutes(65);
        let sampler = ReactionSampler::new(&prices, &reactions, &windows, Duration::seconds(150));
        sample_all(&sampler, &windows, &ev, now);

        let tracked = assets();
        let builder = ReportBuilder::new(&tracked, &windows, &sampler);
        let a = builder.build(&ev, &payems(), now);
        let b = builder.build(&ev, &payems(), now);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn all_cells_resolved_is_complete() {
        let prices = PriceStore::new();
        let reactions = ReactionStore::new();
        let windows = WindowSet::default();
        let spy = vec![Asset::new("SPY", AssetClass::Equities)];
        for w in windows.all() {
            prices
                .backfill(&PriceSnapshot::new("SPY", w.target(anchor()), 450.0))
                .unwrap();
        }

        let ev = event();
        let now = anchor() + Duration::days(2);
        let sampler = ReactionSampler::new(&prices, &reactions, &windows, Duration::seconds(150));
        for w in windows.all() {
            sampler.sample(&ev, &spy[0], w, now);
        }

        let report = ReportBuilder::new(&spy, &windows, &sampler).build(&ev, &payems(), now);
        assert!(report.is_complete());
        assert_eq!(report.pending_cells(), 0);
        assert_eq!(report.agreement[0].flat, vec!["SPY".to_string()]);
    }
}
