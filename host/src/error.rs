use shared_types::ErrorCode;

/// Failures of a host API (storage, tabs).
#[derive(Debug, thiserror::Error, Clone)]
pub enum HostError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to decode stored value for {key}: {message}")]
    Decode { key: String, message: String },

    #[error("tabs error: {0}")]
    Tabs(String),

    /// The extension was reloaded or removed under this context.
    #[error("extension context invalidated")]
    ContextInvalidated,
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        HostError::Storage(e.to_string())
    }
}

/// Failures of a cross-context request.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The calling context was torn down; the call fails fast instead of hanging.
    #[error("extension context invalidated")]
    ContextInvalidated,

    #[error("message transport failed: {0}")]
    Transport(String),

    #[error("background returned no response to {0}")]
    NoResponse(&'static str),

    #[error("malformed {kind} response: {message}")]
    Decode { kind: &'static str, message: String },
}

impl MessagingError {
    /// Wire code, when the error maps onto one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            MessagingError::ContextInvalidated => Some(ErrorCode::ExtensionContextInvalid),
            _ => None,
        }
    }
}

impl From<HostError> for MessagingError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::ContextInvalidated => MessagingError::ContextInvalidated,
            other => MessagingError::Transport(other.to_string()),
        }
    }
}
