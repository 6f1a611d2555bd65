use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use corelib::{
    Alert, Asset, AssetClass, CellState, Direction, DirectionalBias, ImpactTier, Indicator,
    PendingReason, PriceSnapshot, ReactionKey, Release, ReleaseFrequency, Report, ReportStatus,
};
use engine::feed::PriceFeed;
use engine::repository::{MemoryRepository, Repository};
use engine::sink::{AlertSink, ChannelSink, LogSink};
use engine::{Engine, EngineDeps, EngineError, IngestOutcome, PriceIngest, TrackerConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc::Receiver;

/// Serves whatever snapshots have been published so far.
#[derive(Default)]
struct ScriptedFeed {
    bars: Mutex<Vec<PriceSnapshot>>,
}

impl ScriptedFeed {
    fn publish(&self, ticker: &str, at: DateTime<Utc>, price: f64) {
        self.bars.lock().push(PriceSnapshot::new(ticker, at, price));
    }
}

#[async_trait]
impl PriceFeed for ScriptedFeed {
    async fn fetch_price(
        &self,
        ticker: &str,
        at_or_before: DateTime<Utc>,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        Ok(self
            .bars
            .lock()
            .iter()
            .filter(|b| b.ticker == ticker && b.at <= at_or_before)
            .max_by_key(|b| b.at)
            .cloned())
    }
}

struct FailingAlerts;

#[async_trait]
impl AlertSink for FailingAlerts {
    async fn send_alert(&self, _alert: &Alert) -> anyhow::Result<()> {
        anyhow::bail!("webhook down")
    }
}

/// April NFP release slot.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 5, 12, 30, 0).unwrap()
}

fn mins(m: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(m)
}

fn payems() -> Indicator {
    let mut ind = Indicator::new(
        "PAYEMS",
        "Non-Farm Payroll",
        ReleaseFrequency::Monthly,
        ImpactTier::VeryHigh,
    );
    ind.bias = DirectionalBias::default().with_class(AssetClass::Equities, Direction::Up);
    ind
}

fn config() -> TrackerConfig {
    TrackerConfig::new(vec![payems()], vec![Asset::new("SPY", AssetClass::Equities)])
}

/// Three prior prints with surprises 0, 50k and 100k: sample std 50k.
async fn seed_history(repo: &MemoryRepository) {
    for (month, actual) in [(1, 150_000.0), (2, 200_000.0), (3, 250_000.0)] {
        let at = Utc.with_ymd_and_hms(2024, month, 5, 13, 30, 0).unwrap();
        repo.append_release(&Release::new("PAYEMS", actual, Some(150_000.0), at))
            .await
            .unwrap();
    }
}

struct Harness {
    engine: Engine,
    repo: Arc<MemoryRepository>,
    feed: Arc<ScriptedFeed>,
    alerts: Receiver<Alert>,
    reports: Receiver<Report>,
}

impl Harness {
    async fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        seed_history(&repo).await;
        Self::over(repo, config()).await
    }

    async fn over(repo: Arc<MemoryRepository>, config: TrackerConfig) -> Self {
        let feed = Arc::new(ScriptedFeed::default());
        let (sink, alerts, reports) = ChannelSink::new(64);
        let sink = Arc::new(sink);
        let engine = Engine::new(
            config,
            EngineDeps {
                repository: repo.clone(),
                alert_sink: sink.clone(),
                report_sink: sink,
                price_feed: Some(feed.clone()),
            },
        )
        .unwrap();
        engine.recover(mins(-60)).await.unwrap();
        Self {
            engine,
            repo,
            feed,
            alerts,
            reports,
        }
    }

    fn latest_report(&mut self) -> Option<Report> {
        let mut last = None;
        while let Ok(r) = self.reports.try_recv() {
            last = Some(r);
        }
        last
    }

    async fn release(&self, actual: f64) {
        let r = Release::new("PAYEMS", actual, Some(150_000.0), t0());
        assert_eq!(
            self.engine.ingest_release(r, t0()).unwrap(),
            IngestOutcome::Accepted
        );
    }
}

fn cell<'a>(report: &'a Report, ticker: &str, window: &str) -> &'a CellState {
    &report
        .assets
        .iter()
        .find(|a| a.ticker == ticker)
        .unwrap()
        .windows
        .iter()
        .find(|c| c.window == window)
        .unwrap()
        .state
}

fn return_of(state: &CellState) -> f64 {
    match state {
        CellState::Resolved { reaction } => reaction.return_pct.unwrap(),
        other => panic!("expected resolved cell, got {other:?}"),
    }
}

#[tokio::test]
async fn nfp_beat_creates_event_alert_and_immediate_reaction() {
    let mut h = Harness::new().await;
    h.engine
        .ingest_price(PriceSnapshot::new("SPY", mins(-30), 450.00))
        .await
        .unwrap();

    h.release(250_000.0).await;

    // still inside the reorder window
    let early = h.engine.run_detection_pass(mins(2)).await.unwrap();
    assert_eq!(early.releases_processed, 0);

    let pass = h.engine.run_detection_pass(mins(5)).await.unwrap();
    assert_eq!(pass.releases_processed, 1);
    assert_eq!(pass.events_created.len(), 1);
    assert_eq!(pass.alerts_sent, 1);
    let event_id = pass.events_created[0];

    let alert = h.alerts.try_recv().unwrap();
    assert_eq!(alert.event_id, event_id);
    assert!((alert.surprise.score.unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(alert.impact, ImpactTier::VeryHigh);

    let first = h.latest_report().unwrap();
    assert_eq!(first.status, ReportStatus::Partial);
    assert_eq!(return_of(cell(&first, "SPY", "pre_event")), 0.0);
    assert_eq!(
        cell(&first, "SPY", "immediate"),
        &CellState::Pending {
            reason: PendingReason::NotElapsed
        }
    );

    assert_eq!(
        h.engine
            .ingest_price(PriceSnapshot::new("SPY", mins(60), 452.25))
            .await
            .unwrap(),
        PriceIngest::Stored
    );
    let pass = h.engine.run_detection_pass(mins(65)).await.unwrap();
    assert_eq!(pass.reactions_resolved, 1);

    let report = h.latest_report().unwrap();
    assert!((return_of(cell(&report, "SPY", "immediate")) - 0.5).abs() < 1e-9);
    assert_eq!(report.agreement[0].agreeing, vec!["SPY".to_string()]);
    assert_eq!(h.repo.reaction_count(), 2);
}

#[tokio::test]
async fn small_beat_is_not_an_event() {
    let mut h = Harness::new().await;
    h.release(152_000.0).await;

    let pass = h.engine.run_detection_pass(mins(5)).await.unwrap();
    assert_eq!(pass.releases_processed, 1);
    assert!(pass.events_created.is_empty());
    assert_eq!(pass.alerts_sent, 0);
    assert!(h.alerts.try_recv().is_err());
    assert!(h.latest_report().is_none());
    assert_eq!(h.engine.pending_len(), 0);
    assert_eq!(h.repo.event_count(), 0);
    assert_eq!(h.engine.history("PAYEMS").len(), 4);
}

#[tokio::test]
async fn long_term_window_waits_for_backfill_then_completes() {
    let mut h = Harness::new().await;
    h.engine
        .ingest_price(PriceSnapshot::new("SPY", mins(-30), 450.00))
        .await
        .unwrap();
    h.release(250_000.0).await;
    let pass = h.engine.run_detection_pass(mins(5)).await.unwrap();
    let event_id = pass.events_created[0];

    h.feed.publish("SPY", mins(60), 452.25);
    h.feed.publish("SPY", mins(240), 455.00);

    // 10 minutes after the long_term target, no bar yet
    let pass = h.engine.run_detection_pass(mins(1450)).await.unwrap();
    assert_eq!(pass.prices_backfilled, 2);
    assert_eq!(pass.reactions_resolved, 2);
    assert!(pass.completed_events.is_empty());

    let report = h.latest_report().unwrap();
    assert_eq!(report.status, ReportStatus::Partial);
    assert_eq!(
        cell(&report, "SPY", "long_term"),
        &CellState::Pending {
            reason: PendingReason::NoSnapshot
        }
    );
    assert!(h.engine.active_events().contains(&event_id));

    h.feed.publish("SPY", mins(1440), 459.00);
    let pass = h.engine.run_detection_pass(mins(1480)).await.unwrap();
    assert_eq!(pass.prices_backfilled, 1);
    assert_eq!(pass.completed_events, vec![event_id]);

    let report = h.latest_report().unwrap();
    assert!(report.is_complete());
    assert!((return_of(cell(&report, "SPY", "long_term")) - 2.0).abs() < 1e-9);
    assert!((return_of(cell(&report, "SPY", "short_term")) - (5.0 / 450.0 * 100.0)).abs() < 1e-9);
    assert!(h.engine.active_events().is_empty());
    assert_eq!(h.engine.pending_len(), 0);

    // settled: dropped from memory, still reportable from the store
    assert_eq!(pass.evicted, 1);
    assert_eq!(h.engine.tracked_events(), 0);
    assert!(h.engine.event(&event_id).is_none());
    assert!(
        h.engine
            .reaction(&ReactionKey::new(event_id, "SPY", "immediate"))
            .is_none()
    );
    let rebuilt = h.engine.report(&event_id, mins(1480)).await.unwrap().unwrap();
    assert_eq!(rebuilt, report);

    // nothing left to do
    let idle = h.engine.run_detection_pass(mins(1490)).await.unwrap();
    assert_eq!(idle.reports_emitted, 0);
}

#[tokio::test]
async fn replayed_release_never_creates_a_second_event() {
    let h = Harness::new().await;
    h.release(250_000.0).await;
    h.engine.run_detection_pass(mins(5)).await.unwrap();

    let replay = Release::new("PAYEMS", 250_000.0, Some(150_000.0), t0());
    assert_eq!(
        h.engine.ingest_release(replay.clone(), mins(10)).unwrap(),
        IngestOutcome::Duplicate
    );
    let pass = h.engine.run_detection_pass(mins(20)).await.unwrap();
    assert!(pass.events_created.is_empty());
    assert_eq!(h.engine.counters().events_created, 1);
    assert_eq!(h.engine.counters().releases_duplicate, 1);

    // and not after a restart either
    let restarted = Harness::over(h.repo.clone(), config()).await;
    assert_eq!(
        restarted.engine.ingest_release(replay, mins(30)).unwrap(),
        IngestOutcome::Duplicate
    );
    assert_eq!(h.repo.event_count(), 1);
}

#[tokio::test]
async fn recovery_requeues_unresolved_cells() {
    let h = Harness::new().await;
    h.engine
        .ingest_price(PriceSnapshot::new("SPY", mins(-30), 450.00))
        .await
        .unwrap();
    h.release(250_000.0).await;
    let pass = h.engine.run_detection_pass(mins(5)).await.unwrap();
    let event_id = pass.events_created[0];
    assert_eq!(h.repo.reaction_count(), 1);

    let repo = h.repo.clone();
    drop(h);

    let feed = Arc::new(ScriptedFeed::default());
    let engine = Engine::new(
        config(),
        EngineDeps {
            repository: repo.clone(),
            alert_sink: Arc::new(LogSink),
            report_sink: Arc::new(LogSink),
            price_feed: Some(feed.clone()),
        },
    )
    .unwrap();
    let summary = engine.recover(mins(30)).await.unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(summary.reactions, 1);
    assert_eq!(summary.pending, 3);
    assert_eq!(summary.prices, 1);

    feed.publish("SPY", mins(60), 452.25);
    engine.run_detection_pass(mins(65)).await.unwrap();
    let immediate = engine
        .reaction(&ReactionKey::new(event_id, "SPY", "immediate"))
        .unwrap();
    assert_eq!(immediate.baseline_price, 450.00);
    assert!((immediate.return_pct.unwrap() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn report_for_an_event_older_than_recovery_is_rebuilt_from_the_store() {
    let h = Harness::new().await;
    h.engine
        .ingest_price(PriceSnapshot::new("SPY", mins(-30), 450.00))
        .await
        .unwrap();
    h.release(250_000.0).await;
    let event_id = h.engine.run_detection_pass(mins(5)).await.unwrap().events_created[0];
    let repo = h.repo.clone();
    drop(h);

    let engine = Engine::new(
        config(),
        EngineDeps {
            repository: repo,
            alert_sink: Arc::new(LogSink),
            report_sink: Arc::new(LogSink),
            price_feed: None,
        },
    )
    .unwrap();
    let now = t0() + Duration::days(3);
    let summary = engine.recover(now).await.unwrap();
    assert_eq!(summary.events, 0);
    assert!(engine.event(&event_id).is_none());

    let report = engine.report(&event_id, now).await.unwrap().unwrap();
    assert_eq!(report.event_id, event_id);
    assert_eq!(report.status, ReportStatus::Partial);
    assert_eq!(return_of(cell(&report, "SPY", "pre_event")), 0.0);
    assert_eq!(
        cell(&report, "SPY", "immediate"),
        &CellState::Pending {
            reason: PendingReason::NoSnapshot
        }
    );

    // same store, same report
    assert_eq!(engine.report(&event_id, now).await.unwrap(), Some(report));
    assert!(engine.report(&uuid::Uuid::new_v4(), now).await.unwrap().is_none());
}

#[tokio::test]
async fn late_release_is_flagged_and_scored_on_earlier_history() {
    let h = Harness::new().await;
    // May print processed first
    let may = Utc.with_ymd_and_hms(2024, 5, 3, 12, 30, 0).unwrap();
    h.engine
        .ingest_release(Release::new("PAYEMS", 150_000.0, Some(150_000.0), may), may)
        .unwrap();
    h.engine
        .run_detection_pass(may + Duration::minutes(5))
        .await
        .unwrap();

    // April arrives a day later
    let now = may + Duration::days(1);
    h.engine
        .ingest_release(Release::new("PAYEMS", 250_000.0, Some(150_000.0), t0()), now)
        .unwrap();
    let pass = h
        .engine
        .run_detection_pass(now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(pass.late_releases, 1);
    // anchored a month ago, so every cell expired and the event is already settled
    assert_eq!(pass.expired, 4);
    assert_eq!(h.engine.tracked_events(), 0);
    let event = h
        .repo
        .load_event(&pass.events_created[0])
        .await
        .unwrap()
        .unwrap();
    assert!(event.late);
    assert_eq!(event.surprise.history_len, 3);
    assert!((event.surprise.score.unwrap() - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn alert_failure_is_surfaced_but_pass_continues() {
    let repo = Arc::new(MemoryRepository::new());
    seed_history(&repo).await;
    let engine = Engine::new(
        config(),
        EngineDeps {
            repository: repo.clone(),
            alert_sink: Arc::new(FailingAlerts),
            report_sink: Arc::new(LogSink),
            price_feed: None,
        },
    )
    .unwrap();
    engine.recover(mins(-60)).await.unwrap();
    engine
        .ingest_release(Release::new("PAYEMS", 250_000.0, Some(150_000.0), t0()), t0())
        .unwrap();

    let pass = engine.run_detection_pass(mins(5)).await.unwrap();
    assert_eq!(pass.events_created.len(), 1);
    assert_eq!(pass.alerts_sent, 0);
    assert_eq!(pass.failures.len(), 1);
    assert!(pass.failures[0].contains("webhook down"));
    assert_eq!(engine.counters().delivery_failures, 1);
    assert_eq!(repo.event_count(), 1);
}

#[tokio::test]
async fn removed_asset_keys_are_abandoned() {
    let h = Harness::new().await;
    h.release(250_000.0).await;
    h.engine.run_detection_pass(mins(5)).await.unwrap();
    assert_eq!(h.engine.pending_len(), 4);

    let mut cfg = config();
    cfg.assets = vec![Asset::new("QQQ", AssetClass::Equities)];
    h.engine.reconfigure(cfg).unwrap();

    let pass = h.engine.run_detection_pass(mins(10)).await.unwrap();
    assert_eq!(pass.abandoned, 4);
    assert_eq!(h.engine.pending_len(), 0);
    assert!(h.engine.active_events().is_empty());
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let h = Harness::new().await;

    let err = h
        .engine
        .ingest_release(Release::new("GDP", 1.0, Some(1.0), t0()), t0())
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownIndicator(_)));
    assert!(err.is_fatal());

    let err = h
        .engine
        .ingest_release(Release::new("PAYEMS", f64::NAN, Some(1.0), t0()), t0())
        .unwrap_err();
    assert!(matches!(err, EngineError::Malformed(_)));
    assert!(!err.is_fatal());

    h.engine
        .ingest_price(PriceSnapshot::new("SPY", mins(5), 450.0))
        .await
        .unwrap();
    let err = h
        .engine
        .ingest_price(PriceSnapshot::new("SPY", mins(0), 449.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Malformed(_)));
    let err = h
        .engine
        .ingest_price(PriceSnapshot::new("SPY", mins(10), -1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Malformed(_)));

    let c = h.engine.counters();
    assert_eq!(c.releases_rejected, 2);
    assert_eq!(c.prices_rejected, 2);
    assert_eq!(c.prices_ingested, 1);
}
