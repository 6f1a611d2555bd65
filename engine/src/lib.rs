//! Surprise detection and market reaction measurement.
//!
//! Entry points live on [`Engine`]: `ingest_release`, `ingest_price` and
//! `run_detection_pass`. Cadence is owned by the caller; every entry point
//! takes an explicit `now`.

pub mod alert;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod feed;
pub mod history;
pub mod metrics;
pub mod pending;
pub mod prices;
pub mod reactions;
pub mod report;
pub mod repository;
pub mod sampler;
pub mod sink;
pub mod surprise;

pub use config::{SamplingPolicy, SurprisePolicy, TrackerConfig, WindowSet};
pub use engine::{Engine, EngineDeps, IngestOutcome, PassSummary, PriceIngest, RecoverySummary};
pub use error::{EngineError, Result};
