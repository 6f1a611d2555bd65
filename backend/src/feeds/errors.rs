use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {source_name}: {reason}")]
    InvalidResponse {
        source_name: &'static str,
        reason: String,
    },

    #[error("{0} credentials are not configured")]
    MissingCredentials(&'static str),
}

impl FeedError {
    pub(crate) fn invalid(source_name: &'static str, reason: impl Into<String>) -> Self {
        FeedError::InvalidResponse {
            source_name,
            reason: reason.into(),
        }
    }
}
