use async_trait::async_trait;
use serde_json::Value;
use shared_types::{Exchange, Request};

use crate::error::MessagingError;

/// Sends a request to the background and resolves with its raw JSON reply.
///
/// Implementations must fail with [`MessagingError::ContextInvalidated`]
/// instead of hanging once the calling context has been torn down.
#[async_trait(?Send)]
pub trait Messenger {
    async fn send(&self, request: Request) -> Result<Value, MessagingError>;
}

/// Send a typed request and decode its typed response.
pub async fn call<E: Exchange>(
    messenger: &dyn Messenger,
    request: E,
) -> Result<E::Response, MessagingError> {
    let request: Request = request.into();
    let kind = request.kind();
    tracing::trace!(kind, "sending request to background");

    let reply = messenger.send(request).await?;
    if reply.is_null() {
        return Err(MessagingError::NoResponse(kind));
    }
    serde_json::from_value(reply).map_err(|e| MessagingError::Decode {
        kind,
        message: e.to_string(),
    })
}
