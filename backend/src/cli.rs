use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use corelib::DataSource;
use engine::feed::{IndicatorFeed, SourceRouter};
use engine::{Engine, EngineDeps, TrackerConfig};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Db;
use crate::feeds::{fred::FredClient, trading_economics::TradingEconomicsClient, yahoo::YahooClient};
use crate::pollers;
use crate::repository_sqlx::SqlxRepository;
use crate::sinks::JsonFileSink;

#[derive(Debug, Parser)]
#[clap(name = "macro-tracker", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll feeds, detect surprises and measure reactions until Ctrl-C.
    Run,

    /// Print the effective configuration and exit.
    ShowConfig,

    /// Print the current report of a stored event as JSON.
    Report {
        #[clap(long)]
        event_id: Uuid,
    },
}

impl Command {
    pub async fn execute(self, cfg: &AppConfig) -> anyhow::Result<()> {
        match self {
            Command::Run => run(cfg).await,
            Command::ShowConfig => {
                print!("{}", describe(cfg, &cfg.tracker_config()?));
                Ok(())
            }
            Command::Report { event_id } => print_report(cfg, event_id).await,
        }
    }
}

/// Human-readable configuration summary.
pub fn describe(cfg: &AppConfig, tracker: &TrackerConfig) -> String {
    let mut out = String::new();
    let on_off = |b: bool| if b { "configured" } else { "not configured" };

    let _ = writeln!(out, "database:     {}", cfg.database_url);
    let _ = writeln!(out, "reports:      {}", cfg.reports_dir().display());
    let _ = writeln!(out, "alerts:       {}", cfg.alerts_file().display());
    let _ = writeln!(out, "fred:         {}", on_off(cfg.fred_api_key.is_some()));
    let _ = writeln!(
        out,
        "tradingecon:  {}",
        on_off(cfg.tradingeconomics_credentials().is_some())
    );

    let _ = writeln!(out, "indicators:   {}", tracker.indicators.len());
    for ind in &tracker.indicators {
        let _ = writeln!(out, "  {:<10} {:?} {}", ind.code, ind.impact, ind.name);
    }

    let mut by_class: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for a in &tracker.assets {
        by_class
            .entry(a.class.to_string())
            .or_default()
            .push(a.ticker.as_str());
    }
    let _ = writeln!(out, "assets:       {}", tracker.assets.len());
    for (class, tickers) in &by_class {
        let _ = writeln!(out, "  {:<10} {}", class, tickers.join(", "));
    }

    let _ = writeln!(
        out,
        "thresholds:   {} std, {}% magnitude",
        tracker.surprise.threshold_std, tracker.surprise.min_magnitude_pct
    );
    let _ = writeln!(
        out,
        "intervals:    macro {}m, market {}m, detection {}m",
        cfg.macro_interval.as_secs() / 60,
        cfg.market_interval.as_secs() / 60,
        cfg.detection_interval.as_secs() / 60
    );
    out
}

fn indicator_feed(cfg: &AppConfig) -> anyhow::Result<SourceRouter> {
    let mut router = SourceRouter::new();

    match &cfg.fred_api_key {
        Some(key) => {
            let fred = FredClient::new(cfg.fred_base_url.clone(), key.clone(), cfg.http_timeout)?;
            router = router.with(DataSource::Fred, Arc::new(fred));
        }
        None => warn!("FRED_API_KEY not set; FRED indicators will not be polled"),
    }

    let te = TradingEconomicsClient::new(
        cfg.tradingeconomics_base_url.clone(),
        cfg.tradingeconomics_credentials(),
        cfg.http_timeout,
    )?;
    Ok(router.with(DataSource::TradingEconomics, Arc::new(te)))
}

async fn build_engine(cfg: &AppConfig) -> anyhow::Result<Arc<Engine>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    let sink = Arc::new(JsonFileSink::create(&cfg.output_dir).await?);
    let yahoo = Arc::new(YahooClient::new(cfg.yahoo_base_url.clone(), cfg.http_timeout)?);

    let engine = Engine::new(
        cfg.tracker_config()?,
        EngineDeps {
            repository: Arc::new(SqlxRepository::new((*db.pool).clone())),
            alert_sink: sink.clone(),
            report_sink: sink,
            price_feed: Some(yahoo),
        },
    )?;
    Ok(Arc::new(engine))
}

async fn run(cfg: &AppConfig) -> anyhow::Result<()> {
    let engine = build_engine(cfg).await?;

    let recovered = engine.recover(Utc::now()).await?;
    info!(
        releases = recovered.releases,
        events = recovered.events,
        reactions = recovered.reactions,
        pending = recovered.pending,
        "state recovered"
    );

    let indicators: Arc<dyn IndicatorFeed> = Arc::new(indicator_feed(cfg)?);
    let prices = Arc::new(YahooClient::new(cfg.yahoo_base_url.clone(), cfg.http_timeout)?);

    let loops = [
        tokio::spawn(pollers::run_macro_poller(
            engine.clone(),
            indicators,
            cfg.macro_interval,
        )),
        tokio::spawn(pollers::run_market_poller(
            engine.clone(),
            prices,
            cfg.market_interval,
        )),
        tokio::spawn(pollers::run_detection_loop(
            engine.clone(),
            cfg.detection_interval,
        )),
    ];

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    for handle in loops {
        handle.abort();
    }

    let c = engine.counters();
    info!(
        events = c.events_created,
        alerts = c.alerts_sent,
        reports = c.reports_sent,
        delivery_failures = c.delivery_failures,
        "stopped"
    );
    Ok(())
}

async fn print_report(cfg: &AppConfig, event_id: Uuid) -> anyhow::Result<()> {
    let engine = build_engine(cfg).await?;
    let now = Utc::now();
    engine.recover(now).await?;

    let report = engine
        .report(&event_id, now)
        .await?
        .with_context(|| format!("no event {event_id}"))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
