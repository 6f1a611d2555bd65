//! File-backed alert and report sinks.
//!
//! Reports are written to `<dir>/reports/<event_id>.json` and replaced on
//! every re-emission (write to a temp file, then rename). Alerts are
//! appended to `<dir>/alerts.jsonl`, one JSON object per line.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use corelib::{Alert, Report};
use engine::sink::{AlertSink, ReportSink};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub struct JsonFileSink {
    reports_dir: PathBuf,
    alerts_file: PathBuf,
    /// Serializes appends to the alert log.
    append_lock: Mutex<()>,
}

impl JsonFileSink {
    pub async fn create(output_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let output_dir = output_dir.as_ref();
        let reports_dir = output_dir.join("reports");
        tokio::fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        Ok(Self {
            reports_dir,
            alerts_file: output_dir.join("alerts.jsonl"),
            append_lock: Mutex::new(()),
        })
    }

    pub fn report_path(&self, report: &Report) -> PathBuf {
        self.reports_dir.join(format!("{}.json", report.event_id))
    }
}

#[async_trait]
impl AlertSink for JsonFileSink {
    async fn send_alert(&self, alert: &Alert) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');

        let _guard = self.append_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.alerts_file)
            .await
            .with_context(|| format!("opening {}", self.alerts_file.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!(event_id = %alert.event_id, "alert appended");
        Ok(())
    }
}

#[async_trait]
impl ReportSink for JsonFileSink {
    async fn send_report(&self, report: &Report) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(report)?;
        let path = self.report_path(report);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;

        debug!(event_id = %report.event_id, path = %path.display(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use corelib::{
        ImpactTier, NoSignalReason, Release, ReportStatus, SurpriseResult,
    };
    use uuid::Uuid;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("macro-tracker-{}", Uuid::new_v4()))
    }

    fn report(id: Uuid, status: ReportStatus) -> Report {
        Report {
            event_id: id,
            indicator: "PAYEMS".into(),
            indicator_name: "Non-Farm Payroll".into(),
            released_at: Utc.with_ymd_and_hms(2024, 4, 5, 12, 30, 0).unwrap(),
            actual: 250_000.0,
            forecast: Some(150_000.0),
            surprise: SurpriseResult::no_signal(NoSignalReason::DegenerateStd, Some(100_000.0), 3),
            late: false,
            status,
            assets: vec![],
            agreement: vec![],
        }
    }

    #[tokio::test]
    async fn report_file_is_replaced_per_event() {
        let dir = scratch();
        let sink = JsonFileSink::create(&dir).await.unwrap();
        let id = Uuid::new_v4();

        sink.send_report(&report(id, ReportStatus::Partial)).await.unwrap();
        sink.send_report(&report(id, ReportStatus::Complete)).await.unwrap();

        let path = dir.join("reports").join(format!("{id}.json"));
        let stored: Report = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(stored.status, ReportStatus::Complete);

        let mut entries = tokio::fs::read_dir(dir.join("reports")).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn alerts_are_appended_as_lines() {
        let dir = scratch();
        let sink = JsonFileSink::create(&dir).await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 4, 5, 12, 30, 0).unwrap();

        for _ in 0..2 {
            let alert = Alert {
                event_id: Uuid::new_v4(),
                indicator: "PAYEMS".into(),
                indicator_name: "Non-Farm Payroll".into(),
                impact: ImpactTier::VeryHigh,
                release: Release::new("PAYEMS", 250_000.0, Some(150_000.0), at),
                surprise: SurpriseResult::no_signal(NoSignalReason::DegenerateStd, None, 0),
                emitted_at: at,
            };
            sink.send_alert(&alert).await.unwrap();
        }

        let body = tokio::fs::read_to_string(dir.join("alerts.jsonl")).await.unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Alert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.impact, ImpactTier::VeryHigh);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
