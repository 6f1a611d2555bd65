use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Caller referenced an indicator the tracker is not configured for.
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record rejected at ingestion; nothing was stored.
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("{sink} delivery failed after {attempts} attempt(s): {reason}")]
    Delivery {
        sink: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Configuration misuse. Everything else degrades to pending / retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownIndicator(_)
                | EngineError::UnknownAsset(_)
                | EngineError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
