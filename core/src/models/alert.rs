use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::indicator::ImpactTier;
use super::release::Release;
use super::surprise::SurpriseResult;

/// Notification payload for a significant surprise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event_id: Uuid,
    pub indicator: String,
    pub indicator_name: String,
    pub impact: ImpactTier,
    pub release: Release,
    pub surprise: SurpriseResult,
    pub emitted_at: DateTime<Utc>,
}
