//! HTTP clients for the upstream data sources.
//!
//! Each client parses its wire format in a pure function so the mapping can
//! be tested without the network.

pub mod errors;
pub mod fred;
pub mod trading_economics;
pub mod yahoo;

use std::time::Duration;

use reqwest::Client;

use errors::FeedError;

pub(crate) fn http_client(timeout: Duration) -> Result<Client, FeedError> {
    Ok(Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(concat!("macro-tracker/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
