use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::AssetClass;
use super::reaction::{PendingReason, WindowReaction};
use super::surprise::SurpriseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Partial,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum CellState {
    Resolved { reaction: WindowReaction },
    Pending { reason: PendingReason },
}

impl CellState {
    pub fn is_pending(&self) -> bool {
        matches!(self, CellState::Pending { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCell {
    pub window: String,
    pub offset_minutes: i64,
    pub state: CellState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReactions {
    pub ticker: String,
    pub class: AssetClass,
    pub windows: Vec<WindowCell>,
}

/// Which assets moved the way the indicator's bias says they should.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowAgreement {
    pub window: String,
    pub agreeing: Vec<String>,
    pub disagreeing: Vec<String>,
    pub flat: Vec<String>,
    /// No bias configured for this asset.
    pub unmapped: Vec<String>,
}

/// Replaceable snapshot of one event's multi-asset, multi-window reaction.
///
/// Consumers key reports by `event_id` and keep the latest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub event_id: Uuid,
    pub indicator: String,
    pub indicator_name: String,
    pub released_at: DateTime<Utc>,
    pub actual: f64,
    pub forecast: Option<f64>,
    pub surprise: SurpriseResult,
    pub late: bool,
    pub status: ReportStatus,
    pub assets: Vec<AssetReactions>,
    pub agreement: Vec<WindowAgreement>,
}

impl Report {
    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }

    pub fn pending_cells(&self) -> usize {
        self.assets
            .iter()
            .flat_map(|a| a.windows.iter())
            .filter(|c| c.state.is_pending())
            .count()
    }
}
