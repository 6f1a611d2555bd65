//! Cadenced loops driving the engine.
//!
//! Data flow:
//! IndicatorFeed → Engine::ingest_release   (macro loop, hourly)
//! PriceFeed     → Engine::ingest_price     (market loop, 5 min)
//! Engine::run_detection_pass               (detection loop, 2 min)
//!
//! A failed tick is logged and the loop carries on with the next one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{TraceId, root_span};
use engine::feed::{IndicatorFeed, PriceFeed};
use engine::{Engine, EngineError, IngestOutcome, PriceIngest};
use futures::future::join_all;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub fetched: usize,
    pub accepted: usize,
    pub unavailable: usize,
    pub rejected: usize,
}

/// One macro poll: latest release of every tracked indicator.
pub async fn poll_indicators(engine: &Engine, feed: &dyn IndicatorFeed) -> PollStats {
    let cfg = engine.config();
    let mut stats = PollStats::default();

    let results = join_all(cfg.indicators.iter().map(|ind| feed.fetch_latest(ind))).await;

    for (ind, res) in cfg.indicators.iter().zip(results) {
        let release = match res {
            Ok(Some(r)) => r,
            Ok(None) => {
                debug!(indicator = %ind.code, "no observation yet");
                continue;
            }
            Err(e) => {
                stats.unavailable += 1;
                let e = EngineError::DataUnavailable(format!("{}: {e:#}", ind.code));
                warn!(error = %e, "indicator fetch failed");
                continue;
            }
        };
        stats.fetched += 1;

        match engine.ingest_release(release, Utc::now()) {
            Ok(IngestOutcome::Accepted) => {
                stats.accepted += 1;
                info!(indicator = %ind.code, "new release buffered");
            }
            Ok(IngestOutcome::Duplicate) => {}
            Err(e) if e.is_fatal() => {
                stats.rejected += 1;
                error!(indicator = %ind.code, error = %e, "release refused by configuration");
            }
            Err(_) => stats.rejected += 1,
        }
    }
    stats
}

/// One market poll: last completed bar of every tracked asset.
///
/// Bars are requested as of one interval ago so the still-forming bar,
/// whose close keeps changing under the same timestamp, is never ingested.
pub async fn poll_prices(engine: &Engine, feed: &dyn PriceFeed, bar: Duration) -> PollStats {
    let cfg = engine.config();
    let mut stats = PollStats::default();
    let as_of = Utc::now() - chrono::Duration::from_std(bar).unwrap_or_default();

    let results = join_all(
        cfg.assets
            .iter()
            .map(|a| feed.fetch_price(&a.ticker, as_of)),
    )
    .await;

    for (asset, res) in cfg.assets.iter().zip(results) {
        let snap = match res {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                stats.unavailable += 1;
                let e = EngineError::DataUnavailable(format!("{}: {e:#}", asset.ticker));
                warn!(error = %e, "price fetch failed");
                continue;
            }
        };
        stats.fetched += 1;

        match engine.ingest_price(snap).await {
            Ok(PriceIngest::Stored) => stats.accepted += 1,
            Ok(PriceIngest::Duplicate) => {}
            Err(_) => stats.rejected += 1,
        }
    }
    stats
}

pub async fn run_macro_poller(
    engine: Arc<Engine>,
    feed: Arc<dyn IndicatorFeed>,
    every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_s = every.as_secs(), "macro poller started");

    loop {
        ticker.tick().await;
        let stats = poll_indicators(&engine, feed.as_ref())
            .instrument(root_span("macro_poll", &TraceId::default()))
            .await;
        debug!(?stats, "macro poll finished");
    }
}

pub async fn run_market_poller(
    engine: Arc<Engine>,
    feed: Arc<dyn PriceFeed>,
    every: Duration,
) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_s = every.as_secs(), "market poller started");

    loop {
        ticker.tick().await;
        let stats = poll_prices(&engine, feed.as_ref(), every)
            .instrument(root_span("market_poll", &TraceId::default()))
            .await;
        debug!(?stats, "market poll finished");
    }
}

pub async fn run_detection_loop(engine: Arc<Engine>, every: Duration) -> anyhow::Result<()> {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_s = every.as_secs(), "detection loop started");

    loop {
        ticker.tick().await;
        let res = engine
            .run_detection_pass(Utc::now())
            .instrument(root_span("detection_pass", &TraceId::default()))
            .await;

        match res {
            Ok(s) if !s.events_created.is_empty() || s.reports_emitted > 0 => info!(
                events = s.events_created.len(),
                resolved = s.reactions_resolved,
                reports = s.reports_emitted,
                pending = s.pending,
                failures = s.failures.len(),
                "detection pass"
            ),
            Ok(_) => {}
            Err(e) => error!(error = %e, "detection pass failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use corelib::{
        Asset, AssetClass, ImpactTier, Indicator, PriceSnapshot, Release, ReleaseFrequency,
    };
    use engine::repository::MemoryRepository;
    use engine::sink::LogSink;
    use engine::{EngineDeps, TrackerConfig};
    use tracing_test::traced_test;

    struct StaticFeed;

    #[async_trait]
    impl IndicatorFeed for StaticFeed {
        async fn fetch_latest(&self, ind: &Indicator) -> anyhow::Result<Option<Release>> {
            match ind.code.as_str() {
                "PAYEMS" => Ok(Some(Release::new(
                    "PAYEMS",
                    250_000.0,
                    Some(150_000.0),
                    Utc.with_ymd_and_hms(2024, 4, 5, 12, 30, 0).unwrap(),
                ))),
                "UNRATE" => anyhow::bail!("upstream 503"),
                _ => Ok(None),
            }
        }
    }

    #[async_trait]
    impl PriceFeed for StaticFeed {
        async fn fetch_price(
            &self,
            ticker: &str,
            at_or_before: DateTime<Utc>,
        ) -> anyhow::Result<Option<PriceSnapshot>> {
            let at = at_or_before - chrono::Duration::minutes(1);
            match ticker {
                "SPY" => Ok(Some(PriceSnapshot::new(ticker, at, 450.0))),
                _ => Ok(Some(PriceSnapshot::new(ticker, at, f64::NAN))),
            }
        }
    }

    fn engine() -> Engine {
        let ind = |code: &str| {
            Indicator::new(code, code, ReleaseFrequency::Monthly, ImpactTier::High)
        };
        let cfg = TrackerConfig::new(
            vec![ind("PAYEMS"), ind("UNRATE"), ind("ICSA")],
            vec![
                Asset::new("SPY", AssetClass::Equities),
                Asset::new("^VIX", AssetClass::Volatility),
            ],
        );
        Engine::new(
            cfg,
            EngineDeps {
                repository: Arc::new(MemoryRepository::new()),
                alert_sink: Arc::new(LogSink),
                report_sink: Arc::new(LogSink),
                price_feed: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn macro_poll_buffers_new_releases_once() {
        let engine = engine();
        let first = poll_indicators(&engine, &StaticFeed).await;
        assert_eq!(
            first,
            PollStats {
                fetched: 1,
                accepted: 1,
                unavailable: 1,
                rejected: 0
            }
        );

        let second = poll_indicators(&engine, &StaticFeed).await;
        assert_eq!(second.accepted, 0);
        assert_eq!(engine.counters().releases_duplicate, 1);
        assert!(logs_contain("indicator fetch failed"));
        assert!(logs_contain("upstream 503"));
    }

    #[tokio::test]
    async fn market_poll_stores_valid_bars_only() {
        let engine = engine();
        let stats = poll_prices(&engine, &StaticFeed, Duration::from_secs(300)).await;
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(engine.counters().prices_rejected, 1);
    }
}
