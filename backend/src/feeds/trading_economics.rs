//! Trading Economics calendar feed, for indicators outside FRED's coverage.
//!
//! Calendar rows carry the actual and the consensus forecast as display
//! strings (`"3.9%"`, `"303K"`); both are parsed with the same scale so the
//! surprise stays in consistent units.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use corelib::{Indicator, Release};
use engine::feed::IndicatorFeed;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::errors::FeedError;
use super::http_client;

const SOURCE: &str = "tradingeconomics";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CalendarRow {
    pub date: String,
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub forecast: Option<String>,
    #[serde(default, rename = "TEForecast")]
    pub te_forecast: Option<String>,
}

#[derive(Clone)]
pub struct TradingEconomicsClient {
    http: Client,
    base_url: String,
    credentials: Option<String>,
}

impl TradingEconomicsClient {
    pub fn new(
        base_url: String,
        credentials: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            credentials,
        })
    }

    #[instrument(skip(self), fields(symbol = %symbol), level = "debug")]
    pub async fn calendar(&self, symbol: &str) -> Result<Vec<CalendarRow>, FeedError> {
        let creds = self
            .credentials
            .as_deref()
            .ok_or(FeedError::MissingCredentials(SOURCE))?;
        let url = format!("{}/calendar/ticker/{}", self.base_url, symbol);

        let rows: Vec<CalendarRow> = self
            .http
            .get(&url)
            .query(&[("c", creds), ("f", "json")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(count = rows.len(), "calendar rows fetched");
        Ok(rows)
    }
}

#[async_trait]
impl IndicatorFeed for TradingEconomicsClient {
    async fn fetch_latest(&self, indicator: &Indicator) -> anyhow::Result<Option<Release>> {
        let rows = self.calendar(indicator.symbol()).await?;
        Ok(latest_release(indicator, &rows)?)
    }
}

/// Most recent calendar row with a published actual.
pub fn latest_release(
    indicator: &Indicator,
    rows: &[CalendarRow],
) -> Result<Option<Release>, FeedError> {
    let mut best: Option<(NaiveDateTime, &CalendarRow, f64)> = None;

    for row in rows {
        let Some(actual) = row.actual.as_deref().and_then(parse_display_number) else {
            continue;
        };
        let at = NaiveDateTime::parse_from_str(&row.date, "%Y-%m-%dT%H:%M:%S")
            .map_err(|e| FeedError::invalid(SOURCE, format!("date {:?}: {e}", row.date)))?;
        if best.as_ref().is_none_or(|(b, _, _)| at > *b) {
            best = Some((at, row, actual));
        }
    }

    Ok(best.map(|(at, row, actual)| {
        let forecast = row
            .forecast
            .as_deref()
            .and_then(parse_display_number)
            .or_else(|| row.te_forecast.as_deref().and_then(parse_display_number));
        Release::new(indicator.code.clone(), actual, forecast, at.and_utc())
    }))
}

/// Parses `"303K"`, `"-0.2%"`, `"1.2B"`; `None` for blanks and junk.
pub fn parse_display_number(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches('%').trim();
    if s.is_empty() {
        return None;
    }
    let (digits, scale) = match s.chars().last()? {
        'K' | 'k' => (&s[..s.len() - 1], 1e3),
        'M' => (&s[..s.len() - 1], 1e6),
        'B' => (&s[..s.len() - 1], 1e9),
        'T' => (&s[..s.len() - 1], 1e12),
        _ => (s, 1.0),
    };
    let v = digits.trim().replace(',', "").parse::<f64>().ok()? * scale;
    v.is_finite().then_some(v)
}
