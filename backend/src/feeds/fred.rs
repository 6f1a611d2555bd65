//! FRED (Federal Reserve Economic Data) indicator feed.
//!
//! FRED publishes actuals only. Observations are requested as initial
//! releases (`output_type=4`), so each row's `realtime_start` is the date the
//! value was first published.
//!
//! The naive forecast extends the last change: `prev + (prev - prev2)`. Most
//! tracked series are trending levels (payrolls, CPI), and repeating the last
//! print would score every month of an uptrend as a positive surprise. With
//! fewer than two earlier prints there is no forecast.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use corelib::{Indicator, Release};
use engine::feed::IndicatorFeed;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::errors::FeedError;
use super::http_client;

const SOURCE: &str = "fred";

#[derive(Debug, Deserialize)]
pub struct ObservationsEnvelope {
    #[serde(default)]
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub date: String,
    pub realtime_start: String,
    /// Decimal string; `"."` marks a missing value.
    pub value: String,
}

#[derive(Clone)]
pub struct FredClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FredClient {
    pub fn new(
        base_url: String,
        api_key: String,
        timeout: std::time::Duration,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            api_key,
        })
    }

    #[instrument(skip(self), fields(series = %series_id), level = "debug")]
    pub async fn observations(
        &self,
        series_id: &str,
        limit: usize,
    ) -> Result<ObservationsEnvelope, FeedError> {
        let url = format!("{}/series/observations", self.base_url);
        let limit = limit.to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("output_type", "4"),
                ("realtime_start", "1776-07-04"),
                ("realtime_end", "9999-12-31"),
                ("sort_order", "desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let envelope: ObservationsEnvelope = resp.json().await?;
        debug!(count = envelope.observations.len(), "fred observations fetched");
        Ok(envelope)
    }
}

#[async_trait]
impl IndicatorFeed for FredClient {
    async fn fetch_latest(&self, indicator: &Indicator) -> anyhow::Result<Option<Release>> {
        // a few extra rows in case the newest ones are "."
        let envelope = self.observations(indicator.symbol(), 6).await?;
        Ok(latest_release(indicator, &envelope.observations)?)
    }
}

/// Latest valid observation as a release, forecast from the two before it.
/// `observations` are newest first.
pub fn latest_release(
    indicator: &Indicator,
    observations: &[Observation],
) -> Result<Option<Release>, FeedError> {
    let mut valid = observations
        .iter()
        .filter_map(|o| parse_value(&o.value).map(|v| (o, v)));

    let Some((latest, actual)) = valid.next() else {
        return Ok(None);
    };
    let forecast = match (valid.next(), valid.next()) {
        (Some((_, prev)), Some((_, prev2))) => Some(prev + (prev - prev2)),
        _ => None,
    };

    let published = NaiveDate::parse_from_str(&latest.realtime_start, "%Y-%m-%d").map_err(|e| {
        FeedError::invalid(SOURCE, format!("realtime_start {:?}: {e}", latest.realtime_start))
    })?;
    let time = indicator.release_time_utc.unwrap_or_default();
    let released_at = published.and_time(time).and_utc();

    Ok(Some(Release::new(
        indicator.code.clone(),
        actual,
        forecast,
        released_at,
    )))
}

fn parse_value(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}
