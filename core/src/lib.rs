//! Shared data model for the macro surprise tracker.
//!
//! Everything in here is plain data: reference data (indicators, assets,
//! windows), append-only observations (releases, price snapshots) and the
//! derived records the engine produces (events, reactions, reports, alerts).

pub mod models;

pub use models::*;
