//! Data-feed seams.
//!
//! Feeds return `Ok(None)` when the upstream simply has nothing yet; errors
//! are transport or decoding failures. Either way the engine treats the data
//! as unavailable and tries again on the next poll.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corelib::{DataSource, Indicator, PriceSnapshot, Release};

#[async_trait]
pub trait IndicatorFeed: Send + Sync + 'static {
    /// Most recent release of `indicator`, if the upstream has one.
    async fn fetch_latest(&self, indicator: &Indicator) -> anyhow::Result<Option<Release>>;
}

#[async_trait]
pub trait PriceFeed: Send + Sync + 'static {
    /// Latest bar for `ticker` at or before `at_or_before`.
    async fn fetch_price(
        &self,
        ticker: &str,
        at_or_before: DateTime<Utc>,
    ) -> anyhow::Result<Option<PriceSnapshot>>;
}

/// Dispatches each indicator to the feed registered for its [`DataSource`].
#[derive(Default, Clone)]
pub struct SourceRouter {
    feeds: HashMap<DataSource, Arc<dyn IndicatorFeed>>,
}

impl SourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: DataSource, feed: Arc<dyn IndicatorFeed>) -> Self {
        self.feeds.insert(source, feed);
        self
    }

    pub fn supports(&self, source: DataSource) -> bool {
        self.feeds.contains_key(&source)
    }
}

#[async_trait]
impl IndicatorFeed for SourceRouter {
    async fn fetch_latest(&self, indicator: &Indicator) -> anyhow::Result<Option<Release>> {
        let feed = self.feeds.get(&indicator.source).ok_or_else(|| {
            anyhow::anyhow!(
                "no feed registered for source {:?} (indicator {})",
                indicator.source,
                indicator.code
            )
        })?;
        feed.fetch_latest(indicator).await
    }
}
