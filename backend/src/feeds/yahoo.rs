//! Yahoo Finance chart API price feed (5 minute bars).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use corelib::PriceSnapshot;
use engine::feed::PriceFeed;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::errors::FeedError;
use super::http_client;

const SOURCE: &str = "yahoo";

#[derive(Debug, Deserialize)]
pub struct ChartEnvelope {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
}

#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
        })
    }

    #[instrument(skip(self), fields(ticker = %ticker), level = "debug")]
    pub async fn chart(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ChartEnvelope, FeedError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, encode_segment(ticker));
        let period1 = from.timestamp().to_string();
        let period2 = to.timestamp().to_string();

        let envelope: ChartEnvelope = self
            .http
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "5m"),
                ("includePrePost", "false"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("yahoo chart fetched");
        Ok(envelope)
    }
}

#[async_trait]
impl PriceFeed for YahooClient {
    async fn fetch_price(
        &self,
        ticker: &str,
        at_or_before: DateTime<Utc>,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        let from = at_or_before - Duration::hours(2);
        let to = at_or_before + Duration::minutes(5);
        let envelope = self.chart(ticker, from, to).await?;
        Ok(last_close(ticker, &envelope, at_or_before)?)
    }
}

/// Last bar with a close at or before `at_or_before`.
pub fn last_close(
    ticker: &str,
    envelope: &ChartEnvelope,
    at_or_before: DateTime<Utc>,
) -> Result<Option<PriceSnapshot>, FeedError> {
    if let Some(err) = &envelope.chart.error {
        if !err.is_null() {
            return Err(FeedError::invalid(SOURCE, format!("{ticker}: {err}")));
        }
    }
    let Some(result) = envelope.chart.result.as_ref().and_then(|r| r.first()) else {
        return Ok(None);
    };
    let Some(quote) = result.indicators.quote.first() else {
        return Ok(None);
    };
    if quote.close.len() != result.timestamp.len() {
        return Err(FeedError::invalid(
            SOURCE,
            format!(
                "{ticker}: {} timestamps but {} closes",
                result.timestamp.len(),
                quote.close.len()
            ),
        ));
    }

    let cutoff = at_or_before.timestamp();
    let best = result
        .timestamp
        .iter()
        .zip(&quote.close)
        .filter(|(ts, close)| **ts <= cutoff && close.is_some_and(|c| c.is_finite() && c > 0.0))
        .max_by_key(|(ts, _)| **ts);

    let Some((ts, close)) = best else {
        return Ok(None);
    };
    let at = DateTime::from_timestamp(*ts, 0)
        .ok_or_else(|| FeedError::invalid(SOURCE, format!("{ticker}: timestamp {ts}")))?;
    Ok(close.map(|c| PriceSnapshot::new(ticker, at, c)))
}

/// Percent-encodes a path segment (`^VIX`, `EURUSD=X`).
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
