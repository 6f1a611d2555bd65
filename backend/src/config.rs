use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use engine::TrackerConfig;

use crate::catalog;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Directory for report and alert files.
    pub output_dir: PathBuf,

    /// JSON log lines instead of pretty output (`APP_ENV=production`).
    pub json_logs: bool,

    // =========================
    // Data sources
    // =========================
    pub fred_api_key: Option<String>,
    pub fred_base_url: String,

    /// Only needed for indicators sourced from Trading Economics.
    pub tradingeconomics_key: Option<String>,
    pub tradingeconomics_secret: Option<String>,
    pub tradingeconomics_base_url: String,

    pub yahoo_base_url: String,
    pub http_timeout: Duration,

    // =========================
    // Detection
    // =========================
    pub surprise_threshold_std: f64,
    pub min_surprise_magnitude_pct: f64,

    // =========================
    // Loop cadence
    // =========================
    pub macro_interval: Duration,
    pub market_interval: Duration,
    pub detection_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let float = |key: &str, default: f64| -> Result<f64> {
            match get(key) {
                Some(v) => v
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("{key} must be a number, got {v:?}")),
                None => Ok(default),
            }
        };
        let minutes = |key: &str, default: u64| -> Result<Duration> {
            let m = match get(key) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be whole minutes, got {v:?}"))?,
                None => default,
            };
            anyhow::ensure!(m > 0, "{key} must be at least one minute");
            Ok(Duration::from_secs(m * 60))
        };

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://macro_tracker.db?mode=rwc".to_string()),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            json_logs: get("APP_ENV").is_some_and(|v| v == "production"),

            fred_api_key: get("FRED_API_KEY").filter(|k| k != "demo"),
            fred_base_url: get("FRED_BASE_URL")
                .unwrap_or_else(|| "https://api.stlouisfed.org/fred".to_string()),

            tradingeconomics_key: get("TRADINGECONOMICS_KEY"),
            tradingeconomics_secret: get("TRADINGECONOMICS_SECRET"),
            tradingeconomics_base_url: get("TRADINGECONOMICS_BASE_URL")
                .unwrap_or_else(|| "https://api.tradingeconomics.com".to_string()),

            yahoo_base_url: get("YAHOO_BASE_URL")
                .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string()),
            http_timeout: Duration::from_secs(10),

            surprise_threshold_std: float("SURPRISE_THRESHOLD_STD", 0.5)?,
            min_surprise_magnitude_pct: float("MIN_SURPRISE_MAGNITUDE", 0.1)?,

            macro_interval: minutes("MACRO_INTERVAL_MINUTES", 60)?,
            market_interval: minutes("MARKET_INTERVAL_MINUTES", 5)?,
            detection_interval: minutes("DETECTION_INTERVAL_MINUTES", 2)?,
        })
    }

    /// Default catalog with this configuration's overrides applied.
    pub fn tracker_config(&self) -> Result<TrackerConfig> {
        let mut cfg = TrackerConfig::new(catalog::default_indicators(), catalog::default_assets());
        cfg.surprise.threshold_std = self.surprise_threshold_std;
        cfg.surprise.min_magnitude_pct = self.min_surprise_magnitude_pct;
        cfg.sampling.price_interval = chrono::Duration::from_std(self.market_interval)
            .context("market interval out of range")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tradingeconomics_credentials(&self) -> Option<String> {
        match (&self.tradingeconomics_key, &self.tradingeconomics_secret) {
            (Some(k), Some(s)) => Some(format!("{k}:{s}")),
            (Some(k), None) => Some(k.clone()),
            _ => None,
        }
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join("reports")
    }

    pub fn alerts_file(&self) -> PathBuf {
        self.output_dir.join("alerts.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_the_free_tier_setup() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.macro_interval, Duration::from_secs(3600));
        assert_eq!(cfg.market_interval, Duration::from_secs(300));
        assert_eq!(cfg.detection_interval, Duration::from_secs(120));
        assert_eq!(cfg.surprise_threshold_std, 0.5);
        assert_eq!(cfg.min_surprise_magnitude_pct, 0.1);
        assert!(cfg.fred_api_key.is_none());
        assert!(!cfg.json_logs);
        assert_eq!(cfg.alerts_file(), PathBuf::from("output/alerts.jsonl"));
    }

    #[test]
    fn overrides_flow_into_tracker_config() {
        let cfg = from(&[
            ("SURPRISE_THRESHOLD_STD", "1.5"),
            ("MARKET_INTERVAL_MINUTES", "1"),
            ("APP_ENV", "production"),
            ("FRED_API_KEY", "abc"),
        ])
        .unwrap();
        assert!(cfg.json_logs);
        assert_eq!(cfg.fred_api_key.as_deref(), Some("abc"));

        let tracker = cfg.tracker_config().unwrap();
        assert_eq!(tracker.surprise.threshold_std, 1.5);
        assert_eq!(tracker.sampling.tolerance(), chrono::Duration::seconds(30));
    }

    #[test]
    fn demo_key_counts_as_unset() {
        let cfg = from(&[("FRED_API_KEY", "demo")]).unwrap();
        assert!(cfg.fred_api_key.is_none());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = from(&[("DETECTION_INTERVAL_MINUTES", "soon")]).unwrap_err();
        assert!(format!("{err:#}").contains("DETECTION_INTERVAL_MINUTES"));
        assert!(from(&[("MACRO_INTERVAL_MINUTES", "0")]).is_err());
        assert!(from(&[("SURPRISE_THRESHOLD_STD", "-1")])
            .unwrap()
            .tracker_config()
            .is_err());
    }
}
