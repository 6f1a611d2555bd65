pub mod alert;
pub mod asset;
pub mod event;
pub mod indicator;
pub mod reaction;
pub mod release;
pub mod report;
pub mod surprise;

pub use alert::Alert;
pub use asset::{Asset, AssetClass, PriceSnapshot};
pub use event::Event;
pub use indicator::{DataSource, Direction, DirectionalBias, ImpactTier, Indicator, ReleaseFrequency};
pub use reaction::{PendingReason, ReactionKey, WindowReaction, WindowSpec};
pub use release::{Release, ReleaseKey};
pub use report::{AssetReactions, CellState, Report, ReportStatus, WindowAgreement, WindowCell};
pub use surprise::{NoSignalReason, SurpriseDirection, SurpriseResult, Verdict};
