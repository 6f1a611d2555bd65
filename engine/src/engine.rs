//! Engine: wires the stores, the detector, the sampler and the sinks
//! together behind three entry points.
//!
//! - `ingest_release` validates and buffers a release (sync, cheap).
//! - `ingest_price` validates, stores and persists a live price snapshot.
//! - `run_detection_pass` flushes the reorder buffer, creates events, samples
//!   pending reactions and emits reports.
//!
//! Passes are serialized; ingestion runs concurrently with a pass. No lock
//! guard is ever held across an `.await`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use common::{annotate_span, child_span, warn_if_slow};
use corelib::{
    Event, Indicator, PriceSnapshot, ReactionKey, Release, Report, WindowReaction,
};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::alert::AlertDispatcher;
use crate::config::TrackerConfig;
use crate::detector::EventDetector;
use crate::error::{EngineError, Result};
use crate::feed::PriceFeed;
use crate::history::ReleaseStore;
use crate::metrics::{CounterSnapshot, Counters, add, bump};
use crate::pending::{PendingEntry, PendingSet};
use crate::prices::{AppendOutcome, PriceStore};
use crate::reactions::ReactionStore;
use crate::report::ReportBuilder;
use crate::repository::Repository;
use crate::sampler::{ReactionSampler, Sample};
use crate::sink::{AlertSink, ReportSink, deliver_with_retry};

/// External collaborators handed to [`Engine::new`].
pub struct EngineDeps {
    pub repository: Arc<dyn Repository>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub report_sink: Arc<dyn ReportSink>,
    /// Used to backfill prices for elapsed windows; `None` disables backfill.
    pub price_feed: Option<Arc<dyn PriceFeed>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceIngest {
    Stored,
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassSummary {
    pub releases_processed: usize,
    pub late_releases: usize,
    pub events_created: Vec<Uuid>,
    pub alerts_sent: usize,
    pub prices_backfilled: usize,
    pub reactions_resolved: usize,
    pub reports_emitted: usize,
    pub completed_events: Vec<Uuid>,
    /// Events with nothing left to resolve, dropped from memory.
    pub evicted: usize,
    pub abandoned: usize,
    pub expired: usize,
    /// Keys still waiting after this pass.
    pub pending: usize,
    /// Delivery and storage failures; the pass itself carried on.
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoverySummary {
    pub releases: usize,
    pub events: usize,
    pub reactions: usize,
    pub prices: usize,
    pub pending: usize,
}

pub struct Engine {
    config: RwLock<Arc<TrackerConfig>>,

    releases: ReleaseStore,
    prices: PriceStore,
    reactions: ReactionStore,
    detector: EventDetector,
    pending: PendingSet,
    /// Events that still have unresolved cells.
    active: Mutex<BTreeSet<Uuid>>,

    repository: Arc<dyn Repository>,
    alerts: AlertDispatcher,
    report_sink: Arc<dyn ReportSink>,
    price_feed: Option<Arc<dyn PriceFeed>>,

    counters: Counters,
    pass_lock: tokio::sync::Mutex<()>,
}

const SLOW_STORAGE: StdDuration = StdDuration::from_millis(100);
const SLOW_BACKFILL: StdDuration = StdDuration::from_secs(5);

impl Engine {
    /// Fails fast on an invalid configuration.
    pub fn new(config: TrackerConfig, deps: EngineDeps) -> Result<Self> {
        config.validate()?;
        let counters = Counters::default();
        Ok(Self {
            pending: PendingSet::new(config.pending_capacity),
            config: RwLock::new(Arc::new(config)),
            releases: ReleaseStore::new(),
            prices: PriceStore::new(),
            reactions: ReactionStore::new(),
            detector: EventDetector::new(),
            active: Mutex::new(BTreeSet::new()),
            repository: deps.repository,
            alerts: AlertDispatcher::new(deps.alert_sink, counters.clone()),
            report_sink: deps.report_sink,
            price_feed: deps.price_feed,
            counters,
            pass_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> Arc<TrackerConfig> {
        self.config.read().clone()
    }

    /// Swaps the tracked configuration. Buffered releases of removed
    /// indicators are dropped now; pending keys of removed indicators, assets
    /// or windows are dropped on the next pass. The pending capacity is fixed
    /// at construction.
    pub fn reconfigure(&self, config: TrackerConfig) -> Result<()> {
        config.validate()?;
        let old = self.config();
        for ind in &old.indicators {
            if config.indicator(&ind.code).is_none() {
                self.detector.forget_indicator(&ind.code);
            }
        }
        info!(
            indicators = config.indicators.len(),
            assets = config.assets.len(),
            windows = config.windows.len(),
            "tracker reconfigured"
        );
        *self.config.write() = Arc::new(config);
        Ok(())
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// An event still held in memory (unresolved cells remain).
    pub fn event(&self, id: &Uuid) -> Option<Event> {
        self.detector.event(id)
    }

    pub fn tracked_events(&self) -> usize {
        self.detector.event_count()
    }

    pub fn reaction(&self, key: &ReactionKey) -> Option<WindowReaction> {
        self.reactions.get(key)
    }

    pub fn history(&self, indicator: &str) -> Vec<Release> {
        self.releases.history(indicator)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_events(&self) -> Vec<Uuid> {
        self.active.lock().iter().copied().collect()
    }

    /// Validates and buffers a release for the next detection pass.
    pub fn ingest_release(&self, release: Release, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let cfg = self.config();
        if let Err(e) = cfg
            .require_indicator(&release.indicator)
            .and_then(|_| validate_release(&release))
        {
            bump(&self.counters.releases_rejected);
            warn!(indicator = %release.indicator, error = %e, "release rejected");
            return Err(e);
        }

        if self.detector.offer(release, now) {
            bump(&self.counters.releases_ingested);
            Ok(IngestOutcome::Accepted)
        } else {
            bump(&self.counters.releases_duplicate);
            Ok(IngestOutcome::Duplicate)
        }
    }

    /// Appends a live snapshot and persists it.
    #[instrument(skip(self, snap), fields(ticker = %snap.ticker, at = %snap.at))]
    pub async fn ingest_price(&self, snap: PriceSnapshot) -> Result<PriceIngest> {
        let cfg = self.config();
        cfg.require_asset(&snap.ticker)?;

        match self.prices.append(&snap) {
            Ok(AppendOutcome::Duplicate) => Ok(PriceIngest::Duplicate),
            Ok(AppendOutcome::Stored) => {
                bump(&self.counters.prices_ingested);
                warn_if_slow("append_price", SLOW_STORAGE, self.repository.append_price(&snap))
                    .await
                    .map_err(|e| EngineError::Storage(e.context("persisting price snapshot")))?;
                Ok(PriceIngest::Stored)
            }
            Err(e) => {
                bump(&self.counters.prices_rejected);
                warn!(error = %e, "price snapshot rejected");
                Err(e)
            }
        }
    }

    /// One detection pass at `now`. Serialized with other passes.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn run_detection_pass(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        let _pass = self.pass_lock.lock().await;
        let cfg = self.config();
        let mut summary = PassSummary::default();
        let mut touched: BTreeSet<Uuid> = BTreeSet::new();

        self.detect_events(&cfg, now, &mut summary, &mut touched)
            .instrument(child_span("detect"))
            .await;

        let live = self.filter_pending(&cfg, now, &mut summary);

        self.backfill_prices(&cfg, &live, now, &mut summary)
            .instrument(child_span("backfill"))
            .await;

        self.sample_pending(&cfg, live, now, &mut summary, &mut touched)
            .instrument(child_span("sample"))
            .await;

        self.emit_reports(&cfg, &touched, now, &mut summary)
            .instrument(child_span("report"))
            .await;

        let still_pending = self.pending.event_ids();
        self.active.lock().retain(|id| still_pending.contains(id));
        for id in self.detector.event_ids() {
            if !still_pending.contains(&id) {
                self.evict(&id);
                summary.evicted += 1;
            }
        }

        let pruned = self.prices.prune_before(now - cfg.price_retention());
        if pruned > 0 {
            debug!(pruned, "old price snapshots pruned");
        }

        summary.pending = self.pending.len();
        debug!(
            processed = summary.releases_processed,
            events = summary.events_created.len(),
            resolved = summary.reactions_resolved,
            reports = summary.reports_emitted,
            pending = summary.pending,
            "detection pass finished"
        );
        Ok(summary)
    }

    async fn detect_events(
        &self,
        cfg: &TrackerConfig,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
        touched: &mut BTreeSet<Uuid>,
    ) {
        for ready in self.detector.flush_ready(now, cfg.lateness) {
            let Some(indicator) = cfg.indicator(&ready.release.indicator) else {
                debug!(indicator = %ready.release.indicator, "indicator untracked; release dropped");
                continue;
            };

            if let Err(e) = self.repository.append_release(&ready.release).await {
                error!(indicator = %indicator.code, error = %format!("{e:#}"), "persisting release failed");
                summary.failures.push(format!("storage: {e:#}"));
            }

            if ready.late {
                bump(&self.counters.releases_late);
                summary.late_releases += 1;
            }

            let det = self
                .detector
                .detect(indicator, ready, &self.releases, &cfg.surprise, now);
            summary.releases_processed += 1;

            let Some(event) = det.created else {
                debug!(
                    indicator = %indicator.code,
                    verdict = ?det.surprise.verdict,
                    score = ?det.surprise.score,
                    "release evaluated; no event"
                );
                continue;
            };

            annotate_span(&indicator.code, Some(&event.id));
            bump(&self.counters.events_created);
            summary.events_created.push(event.id);

            if let Err(e) = self.repository.insert_event(&event).await {
                error!(event_id = %event.id, error = %format!("{e:#}"), "persisting event failed");
                summary.failures.push(format!("storage: {e:#}"));
            }

            match self.alerts.dispatch(indicator, &event, now).await {
                Ok(Some(_)) => summary.alerts_sent += 1,
                Ok(None) => {}
                Err(e) => summary.failures.push(e.to_string()),
            }

            self.enqueue_event(cfg, &event);
            touched.insert(event.id);
        }
    }

    /// Queues every (asset, window) cell of `event` that has no reaction yet.
    fn enqueue_event(&self, cfg: &TrackerConfig, event: &Event) -> usize {
        let mut queued = 0;
        for asset in &cfg.assets {
            for w in cfg.windows.all() {
                let key = ReactionKey::new(event.id, asset.ticker.clone(), w.name.clone());
                if self.reactions.contains(&key) {
                    continue;
                }
                let entry = PendingEntry {
                    key,
                    anchor: event.anchor,
                };
                if self.pending.push(entry) {
                    queued += 1;
                } else {
                    bump(&self.counters.pending_dropped_full);
                    warn!(event_id = %event.id, ticker = %asset.ticker, window = %w.name, "pending set full; key dropped");
                }
            }
        }
        if queued > 0 {
            self.active.lock().insert(event.id);
        }
        queued
    }

    /// Drains the pending set, dropping keys that no longer belong to the
    /// configuration or have waited past the longest window plus grace.
    fn filter_pending(
        &self,
        cfg: &TrackerConfig,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) -> Vec<(PendingEntry, Event)> {
        let deadline = cfg.windows.longest() + cfg.pending_grace;
        let mut live = Vec::new();

        for entry in self.pending.drain() {
            let event = self.detector.event(&entry.key.event_id);
            let tracked = event.as_ref().is_some_and(|ev| {
                cfg.indicator(&ev.indicator).is_some()
                    && cfg.asset(&entry.key.ticker).is_some()
                    && cfg.windows.find(&entry.key.window).is_some()
            });
            let Some(event) = event.filter(|_| tracked) else {
                bump(&self.counters.pending_abandoned);
                summary.abandoned += 1;
                continue;
            };

            if now > entry.anchor + deadline {
                bump(&self.counters.pending_expired);
                summary.expired += 1;
                warn!(
                    event_id = %entry.key.event_id,
                    ticker = %entry.key.ticker,
                    window = %entry.key.window,
                    "reaction never resolved; abandoning"
                );
                continue;
            }
            live.push((entry, event));
        }

        // baselines first so horizons can resolve in the same pass
        live.sort_by_key(|(e, _)| !cfg.windows.is_baseline(&e.key.window));
        live
    }

    /// Asks the price feed for the snapshot at every elapsed target that the
    /// store cannot answer yet. Requests run concurrently.
    async fn backfill_prices(
        &self,
        cfg: &TrackerConfig,
        live: &[(PendingEntry, Event)],
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) {
        let Some(feed) = &self.price_feed else {
            return;
        };
        let tolerance = cfg.sampling.tolerance();

        let wanted: BTreeSet<(String, DateTime<Utc>)> = live
            .iter()
            .filter_map(|(entry, event)| {
                let w = cfg.windows.find(&entry.key.window)?;
                let target = w.target(event.anchor);
                let missing = now >= target
                    && !self.reactions.contains(&entry.key)
                    && self
                        .prices
                        .at_or_before(&entry.key.ticker, target, tolerance)
                        .is_none();
                missing.then(|| (entry.key.ticker.clone(), target))
            })
            .collect();
        if wanted.is_empty() {
            return;
        }

        let requests = wanted
            .iter()
            .map(|(ticker, target)| feed.fetch_price(ticker, *target));
        let results = warn_if_slow("price_backfill", SLOW_BACKFILL, join_all(requests)).await;

        for ((ticker, target), res) in wanted.iter().zip(results) {
            let snap = match res {
                Ok(Some(snap)) => snap,
                Ok(None) => {
                    debug!(ticker = %ticker, target = %target, "no backfill price yet");
                    continue;
                }
                Err(e) => {
                    let e = EngineError::DataUnavailable(format!("{ticker} at {target}: {e:#}"));
                    warn!(error = %e, "price backfill failed");
                    continue;
                }
            };
            if snap.ticker != *ticker || snap.at > *target {
                warn!(ticker = %ticker, at = %snap.at, target = %target, "backfill returned a snapshot past its target; ignored");
                continue;
            }
            match self.prices.backfill(&snap) {
                Ok(AppendOutcome::Stored) => {
                    bump(&self.counters.prices_backfilled);
                    summary.prices_backfilled += 1;
                    if let Err(e) = self.repository.append_price(&snap).await {
                        error!(ticker = %ticker, error = %format!("{e:#}"), "persisting backfilled price failed");
                        summary.failures.push(format!("storage: {e:#}"));
                    }
                }
                Ok(AppendOutcome::Duplicate) => {}
                Err(e) => {
                    bump(&self.counters.prices_rejected);
                    warn!(error = %e, "backfilled snapshot rejected");
                }
            }
        }
    }

    async fn sample_pending(
        &self,
        cfg: &TrackerConfig,
        live: Vec<(PendingEntry, Event)>,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
        touched: &mut BTreeSet<Uuid>,
    ) {
        let mut fresh: Vec<WindowReaction> = Vec::new();
        {
            let sampler = ReactionSampler::new(
                &self.prices,
                &self.reactions,
                &cfg.windows,
                cfg.sampling.tolerance(),
            );
            for (entry, event) in live {
                let (Some(asset), Some(window)) = (
                    cfg.asset(&entry.key.ticker),
                    cfg.windows.find(&entry.key.window),
                ) else {
                    continue;
                };
                let known = self.reactions.contains(&entry.key);
                match sampler.sample(&event, asset, window, now) {
                    Sample::Resolved(r) => {
                        if !known {
                            touched.insert(r.event_id);
                            fresh.push(r);
                        }
                    }
                    Sample::Pending(reason) => {
                        debug!(
                            event_id = %entry.key.event_id,
                            ticker = %entry.key.ticker,
                            window = %entry.key.window,
                            ?reason,
                            "reaction pending"
                        );
                        if !self.pending.push(entry) {
                            bump(&self.counters.pending_dropped_full);
                        }
                    }
                }
            }
        }

        add(&self.counters.reactions_resolved, fresh.len() as u64);
        summary.reactions_resolved += fresh.len();

        for r in &fresh {
            if let Err(e) = self.repository.insert_reaction(r).await {
                error!(event_id = %r.event_id, error = %format!("{e:#}"), "persisting reaction failed");
                summary.failures.push(format!("storage: {e:#}"));
            }
        }
    }

    async fn emit_reports(
        &self,
        cfg: &TrackerConfig,
        touched: &BTreeSet<Uuid>,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) {
        for id in touched {
            let Some(report) = self.build_report(cfg, id, now) else {
                continue;
            };

            let sink = &self.report_sink;
            match deliver_with_retry("report", || sink.send_report(&report)).await {
                Ok(()) => {
                    bump(&self.counters.reports_sent);
                    summary.reports_emitted += 1;
                }
                Err(e) => {
                    bump(&self.counters.delivery_failures);
                    summary.failures.push(e.to_string());
                }
            }

            if report.is_complete() {
                self.active.lock().remove(id);
                summary.completed_events.push(*id);
                info!(event_id = %id, indicator = %report.indicator, "reaction report complete");
            }
        }
    }

    /// Drops a settled event and its reactions. The release key stays with the
    /// detector so a replay is still a no-op.
    fn evict(&self, id: &Uuid) {
        self.detector.evict(id);
        let reactions = self.reactions.remove_event(id);
        debug!(event_id = %id, reactions, "settled event evicted");
    }

    fn build_report(&self, cfg: &TrackerConfig, id: &Uuid, now: DateTime<Utc>) -> Option<Report> {
        let event = self.detector.event(id)?;
        Some(self.report_over(cfg, &event, &self.reactions, now))
    }

    fn report_over(
        &self,
        cfg: &TrackerConfig,
        event: &Event,
        reactions: &ReactionStore,
        now: DateTime<Utc>,
    ) -> Report {
        let fallback;
        let indicator: &Indicator = match cfg.indicator(&event.indicator) {
            Some(ind) => ind,
            None => {
                fallback = Indicator::new(
                    event.indicator.clone(),
                    event.indicator.clone(),
                    corelib::ReleaseFrequency::Monthly,
                    corelib::ImpactTier::Low,
                );
                &fallback
            }
        };
        let sampler = ReactionSampler::new(
            &self.prices,
            reactions,
            &cfg.windows,
            cfg.sampling.tolerance(),
        );
        ReportBuilder::new(&cfg.assets, &cfg.windows, &sampler).build(event, indicator, now)
    }

    /// Current report for `event_id`, without emitting it. Events no longer
    /// held in memory are rebuilt from the repository.
    pub async fn report(&self, event_id: &Uuid, now: DateTime<Utc>) -> Result<Option<Report>> {
        let cfg = self.config();
        if let Some(report) = self.build_report(&cfg, event_id, now) {
            return Ok(Some(report));
        }

        let Some(event) = self
            .repository
            .load_event(event_id)
            .await
            .map_err(|e| EngineError::Storage(e.context(format!("loading event {event_id}"))))?
        else {
            return Ok(None);
        };
        let stored = ReactionStore::new();
        for r in self
            .repository
            .load_reactions(event_id)
            .await
            .map_err(|e| EngineError::Storage(e.context(format!("loading reactions of {event_id}"))))?
        {
            stored.insert_if_absent(r);
        }
        Ok(Some(self.report_over(&cfg, &event, &stored, now)))
    }

    /// Rebuilds in-memory state from the repository after a restart.
    ///
    /// Events anchored within the longest window plus grace are restored and
    /// every cell without a persisted reaction is queued again.
    #[instrument(skip_all, fields(now = %now))]
    pub async fn recover(&self, now: DateTime<Utc>) -> Result<RecoverySummary> {
        let _pass = self.pass_lock.lock().await;
        let cfg = self.config();
        let repo = &self.repository;
        let mut out = RecoverySummary::default();

        for ind in &cfg.indicators {
            let releases = repo
                .load_releases(&ind.code)
                .await
                .map_err(|e| EngineError::Storage(e.context(format!("loading {} releases", ind.code))))?;
            for r in releases {
                self.detector.mark_processed(&r);
                self.releases.insert(r);
                out.releases += 1;
            }
        }

        let from = now - cfg.price_retention();
        for asset in &cfg.assets {
            let snaps = repo
                .load_prices(&asset.ticker, from, now)
                .await
                .map_err(|e| EngineError::Storage(e.context(format!("loading {} prices", asset.ticker))))?;
            for s in snaps {
                if matches!(self.prices.backfill(&s), Ok(AppendOutcome::Stored)) {
                    out.prices += 1;
                }
            }
        }

        let since = now - (cfg.windows.longest() + cfg.pending_grace);
        let events = repo
            .load_events_since(since)
            .await
            .map_err(|e| EngineError::Storage(e.context("loading events")))?;
        for event in events {
            let reactions = repo
                .load_reactions(&event.id)
                .await
                .map_err(|e| EngineError::Storage(e.context(format!("loading reactions of {}", event.id))))?;
            for r in reactions {
                let (_, inserted) = self.reactions.insert_if_absent(r);
                if inserted {
                    out.reactions += 1;
                }
            }
            self.detector.restore_event(event.clone());
            out.events += 1;
            let queued = if cfg.indicator(&event.indicator).is_some() {
                self.enqueue_event(&cfg, &event)
            } else {
                0
            };
            if queued == 0 {
                self.evict(&event.id);
            }
            out.pending += queued;
        }

        info!(
            releases = out.releases,
            events = out.events,
            reactions = out.reactions,
            prices = out.prices,
            pending = out.pending,
            "state recovered"
        );
        Ok(out)
    }
}

fn validate_release(r: &Release) -> Result<()> {
    if !r.actual.is_finite() {
        return Err(EngineError::Malformed(format!(
            "{} actual {} is not finite",
            r.indicator, r.actual
        )));
    }
    if r.forecast.is_some_and(|f| !f.is_finite()) {
        return Err(EngineError::Malformed(format!(
            "{} forecast is not finite",
            r.indicator
        )));
    }
    if r.surprise_std.is_some_and(|s| !s.is_finite() || s < 0.0) {
        return Err(EngineError::Malformed(format!(
            "{} surprise std must be a finite non-negative number",
            r.indicator
        )));
    }
    Ok(())
}
