//! Push interfaces for alerts and reports.
//!
//! Implementations normalize their failures into `anyhow::Error`; retry
//! policy lives in [`deliver_with_retry`], not in the sinks.

use std::future::Future;

use async_trait::async_trait;
use corelib::{Alert, Report};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{EngineError, Result};

/// Attempts per delivery: the first try plus one retry.
pub const DELIVERY_ATTEMPTS: u32 = 2;

#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    async fn send_alert(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Reports are replaceable snapshots; consumers keep the latest per `event_id`.
#[async_trait]
pub trait ReportSink: Send + Sync + 'static {
    async fn send_report(&self, report: &Report) -> anyhow::Result<()>;
}

/// Runs `attempt` up to [`DELIVERY_ATTEMPTS`] times.
pub async fn deliver_with_retry<F, Fut>(sink: &'static str, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut last = None;
    for n in 1..=DELIVERY_ATTEMPTS {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                if n < DELIVERY_ATTEMPTS {
                    warn!(sink, attempt = n, error = %e, "delivery failed; retrying");
                }
                last = Some(e);
            }
        }
    }

    let reason = last.map(|e| format!("{e:#}")).unwrap_or_default();
    error!(sink, attempts = DELIVERY_ATTEMPTS, reason = %reason, "delivery failed");
    Err(EngineError::Delivery {
        sink,
        attempts: DELIVERY_ATTEMPTS,
        reason,
    })
}

/// Forwards into a bounded tokio channel. A full or closed channel is a
/// delivery failure.
#[derive(Clone)]
pub struct ChannelSink {
    alerts: mpsc::Sender<Alert>,
    reports: mpsc::Sender<Report>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>, mpsc::Receiver<Report>) {
        let (alerts, alert_rx) = mpsc::channel(capacity);
        let (reports, report_rx) = mpsc::channel(capacity);
        (Self { alerts, reports }, alert_rx, report_rx)
    }
}

#[async_trait]
impl AlertSink for ChannelSink {
    async fn send_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts
            .try_send(alert.clone())
            .map_err(|e| anyhow::anyhow!("alert channel: {e}"))
    }
}

#[async_trait]
impl ReportSink for ChannelSink {
    async fn send_report(&self, report: &Report) -> anyhow::Result<()> {
        self.reports
            .try_send(report.clone())
            .map_err(|e| anyhow::anyhow!("report channel: {e}"))
    }
}

/// Writes alerts and reports to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            target: "alerts",
            event_id = %alert.event_id,
            indicator = %alert.indicator,
            impact = %alert.impact,
            actual = alert.release.actual,
            forecast = ?alert.release.forecast,
            score = ?alert.surprise.score,
            "macro surprise"
        );
        Ok(())
    }
}

#[async_trait]
impl ReportSink for LogSink {
    async fn send_report(&self, report: &Report) -> anyhow::Result<()> {
        let body = serde_json::to_string(report)?;
        info!(
            target: "reports",
            event_id = %report.event_id,
            status = ?report.status,
            pending = report.pending_cells(),
            report = %body,
            "reaction report"
        );
        Ok(())
    }
}
