use sqlx::AnyPool;

/// Timestamps are stored as unix milliseconds (UTC); the `Any` driver has
/// no portable datetime type.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Indicator releases
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS releases (
  indicator TEXT NOT NULL,
  released_ms BIGINT NOT NULL,
  actual DOUBLE PRECISION NOT NULL,
  forecast DOUBLE PRECISION,
  surprise_std DOUBLE PRECISION,
  PRIMARY KEY (indicator, released_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    // Price snapshots
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS prices (
  ticker TEXT NOT NULL,
  at_ms BIGINT NOT NULL,
  price DOUBLE PRECISION NOT NULL,
  PRIMARY KEY (ticker, at_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    // Events
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS events (
  event_id TEXT PRIMARY KEY,
  indicator TEXT NOT NULL,
  released_ms BIGINT NOT NULL,
  anchor_ms BIGINT NOT NULL,
  late INTEGER NOT NULL CHECK (late IN (0,1)),
  created_ms BIGINT NOT NULL,
  release_json TEXT NOT NULL,
  surprise_json TEXT NOT NULL,
  UNIQUE (indicator, released_ms)
);
"#,
    )
    .execute(pool)
    .await?;

    // Window reactions
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS reactions (
  event_id TEXT NOT NULL,
  ticker TEXT NOT NULL,
  window_name TEXT NOT NULL,
  target_ms BIGINT NOT NULL,
  sampled_ms BIGINT NOT NULL,
  baseline_price DOUBLE PRECISION NOT NULL,
  post_price DOUBLE PRECISION NOT NULL,
  return_pct DOUBLE PRECISION,
  PRIMARY KEY (event_id, ticker, window_name)
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_events_anchor ON events(anchor_ms);"#)
        .execute(pool)
        .await?;

    Ok(())
}
