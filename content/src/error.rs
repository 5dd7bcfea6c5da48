use host::{HostError, MessagingError};
use shared_types::ErrorCode;

/// Why an overlay operation did not produce a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContentError {
    /// No usable session; the overlay shows "not connected".
    #[error("{0}")]
    Auth(ErrorCode),

    /// Superseded by a newer fetch or a context change. Never shown.
    #[error("ABORT")]
    Aborted,

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("storage failed: {0}")]
    Storage(String),

    /// Error string returned by the background.
    #[error("{0}")]
    Remote(String),
}

impl From<HostError> for ContentError {
    fn from(e: HostError) -> Self {
        ContentError::Storage(e.to_string())
    }
}

impl ContentError {
    /// Classify an `error` field of a background response.
    pub fn from_reply(error: &str) -> Self {
        match ErrorCode::parse(error) {
            Some(code) if code.is_auth() => ContentError::Auth(code),
            Some(ErrorCode::Abort) => ContentError::Aborted,
            _ => ContentError::Remote(error.to_string()),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ContentError::Auth(_))
    }

    /// Text for the overlay's error state.
    pub fn user_message(&self) -> String {
        match self {
            ContentError::Messaging(MessagingError::ContextInvalidated) => {
                "Revu was updated. Reload the page to reconnect.".to_string()
            }
            other => other.to_string(),
        }
    }
}
