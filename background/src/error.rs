use host::HostError;

use crate::api::ApiError;

/// Failures of a background handler. Converted to `{success: false, error}`
/// at the dispatch boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackgroundError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed request: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for BackgroundError {
    fn from(e: serde_json::Error) -> Self {
        BackgroundError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackgroundError>;
