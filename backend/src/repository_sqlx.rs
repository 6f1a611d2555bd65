use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corelib::{Event, PriceSnapshot, Release, WindowReaction};
use engine::repository::Repository;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

/// SQLx-backed implementation of [`Repository`].
/// Responsible only for persistence and row mapping.
pub struct SqlxRepository {
    pool: AnyPool,
}

impl SqlxRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for SqlxRepository {
    async fn append_release(&self, release: &Release) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO releases (indicator, released_ms, actual, forecast, surprise_std)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT DO NOTHING;
"#,
        )
        .bind(release.indicator.clone())
        .bind(release.released_at.timestamp_millis())
        .bind(release.actual)
        .bind(release.forecast)
        .bind(release.surprise_std)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert release {}", release.indicator))?;
        Ok(())
    }

    async fn append_price(&self, snap: &PriceSnapshot) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO prices (ticker, at_ms, price)
VALUES (?, ?, ?)
ON CONFLICT DO NOTHING;
"#,
        )
        .bind(snap.ticker.clone())
        .bind(snap.at.timestamp_millis())
        .bind(snap.price)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert price {}", snap.ticker))?;
        Ok(())
    }

    async fn insert_event(&self, event: &Event) -> anyhow::Result<()> {
        let release_json = serde_json::to_string(&event.release)?;
        let surprise_json = serde_json::to_string(&event.surprise)?;

        sqlx::query(
            r#"
INSERT INTO events (
  event_id, indicator, released_ms, anchor_ms, late, created_ms,
  release_json, surprise_json
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT DO NOTHING;
"#,
        )
        .bind(event.id.to_string())
        .bind(event.indicator.clone())
        .bind(event.release.released_at.timestamp_millis())
        .bind(event.anchor.timestamp_millis())
        .bind(event.late as i64)
        .bind(event.created_at.timestamp_millis())
        .bind(release_json)
        .bind(surprise_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert event {}", event.id))?;
        Ok(())
    }

    async fn insert_reaction(&self, r: &WindowReaction) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO reactions (
  event_id, ticker, window_name, target_ms, sampled_ms,
  baseline_price, post_price, return_pct
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT DO NOTHING;
"#,
        )
        .bind(r.event_id.to_string())
        .bind(r.ticker.clone())
        .bind(r.window.clone())
        .bind(r.target_at.timestamp_millis())
        .bind(r.sampled_at.timestamp_millis())
        .bind(r.baseline_price)
        .bind(r.post_price)
        .bind(r.return_pct)
        .execute(&self.pool)
        .await
        .with_context(|| format!("insert reaction {}/{}/{}", r.event_id, r.ticker, r.window))?;
        Ok(())
    }

    async fn load_releases(&self, indicator: &str) -> anyhow::Result<Vec<Release>> {
        let rows = sqlx::query(
            r#"
SELECT indicator, released_ms, actual, forecast, surprise_std
FROM releases
WHERE indicator = ?
ORDER BY released_ms ASC;
"#,
        )
        .bind(indicator.to_string())
        .fetch_all(&self.pool)
        .await?;

        collect_rows(&rows, row_to_release, "release")
    }

    async fn load_prices(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PriceSnapshot>> {
        let rows = sqlx::query(
            r#"
SELECT ticker, at_ms, price
FROM prices
WHERE ticker = ? AND at_ms >= ? AND at_ms <= ?
ORDER BY at_ms ASC;
"#,
        )
        .bind(ticker.to_string())
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        collect_rows(&rows, row_to_price, "price")
    }

    async fn load_events_since(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
SELECT event_id, indicator, anchor_ms, late, created_ms, release_json, surprise_json
FROM events
WHERE anchor_ms >= ?
ORDER BY anchor_ms ASC, indicator ASC;
"#,
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        collect_rows(&rows, row_to_event, "event")
    }

    async fn load_event(&self, event_id: &Uuid) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query(
            r#"
SELECT event_id, indicator, anchor_ms, late, created_ms, release_json, surprise_json
FROM events
WHERE event_id = ?;
"#,
        )
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    async fn load_reactions(&self, event_id: &Uuid) -> anyhow::Result<Vec<WindowReaction>> {
        let rows = sqlx::query(
            r#"
SELECT event_id, ticker, window_name, target_ms, sampled_ms,
       baseline_price, post_price, return_pct
FROM reactions
WHERE event_id = ?
ORDER BY ticker ASC, target_ms ASC;
"#,
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        collect_rows(&rows, row_to_reaction, "reaction")
    }
}

/* =========================
Row mapping + conversions
========================= */

/// Maps every row, skipping (and logging) rows that fail to decode.
fn collect_rows<T>(
    rows: &[sqlx::any::AnyRow],
    map: fn(&sqlx::any::AnyRow) -> anyhow::Result<T>,
    kind: &'static str,
) -> anyhow::Result<Vec<T>> {
    let mut out = Vec::with_capacity(rows.len());
    for r in rows {
        match map(r) {
            Ok(v) => out.push(v),
            Err(e) => {
                tracing::warn!(kind, error = %e, "skipping malformed row");
            }
        }
    }
    Ok(out)
}

fn ms_to_dt(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn row_to_release(r: &sqlx::any::AnyRow) -> anyhow::Result<Release> {
    Ok(Release {
        indicator: r.try_get::<String, _>("indicator")?,
        actual: r.try_get::<f64, _>("actual")?,
        forecast: r.try_get::<Option<f64>, _>("forecast")?,
        surprise_std: r.try_get::<Option<f64>, _>("surprise_std")?,
        released_at: ms_to_dt(r.try_get("released_ms")?)?,
    })
}

fn row_to_price(r: &sqlx::any::AnyRow) -> anyhow::Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        ticker: r.try_get::<String, _>("ticker")?,
        at: ms_to_dt(r.try_get("at_ms")?)?,
        price: r.try_get::<f64, _>("price")?,
    })
}

fn row_to_event(r: &sqlx::any::AnyRow) -> anyhow::Result<Event> {
    let id_str: String = r.try_get("event_id")?;
    let id = Uuid::parse_str(&id_str).context("invalid event_id")?;

    let release_json: String = r.try_get("release_json")?;
    let surprise_json: String = r.try_get("surprise_json")?;

    Ok(Event {
        id,
        indicator: r.try_get::<String, _>("indicator")?,
        release: serde_json::from_str(&release_json).context("invalid release_json")?,
        surprise: serde_json::from_str(&surprise_json).context("invalid surprise_json")?,
        anchor: ms_to_dt(r.try_get("anchor_ms")?)?,
        late: r.try_get::<i64, _>("late")? == 1,
        created_at: ms_to_dt(r.try_get("created_ms")?)?,
    })
}

fn row_to_reaction(r: &sqlx::any::AnyRow) -> anyhow::Result<WindowReaction> {
    let id_str: String = r.try_get("event_id")?;

    Ok(WindowReaction {
        event_id: Uuid::parse_str(&id_str).context("invalid event_id")?,
        ticker: r.try_get::<String, _>("ticker")?,
        window: r.try_get::<String, _>("window_name")?,
        target_at: ms_to_dt(r.try_get("target_ms")?)?,
        sampled_at: ms_to_dt(r.try_get("sampled_ms")?)?,
        baseline_price: r.try_get::<f64, _>("baseline_price")?,
        post_price: r.try_get::<f64, _>("post_price")?,
        return_pct: r.try_get::<Option<f64>, _>("return_pct")?,
    })
}
