use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use host::{Messenger, MessagingError};
use serde_json::Value;
use shared_types::Request;

use crate::coordinator::Coordinator;

/// In-process [`Messenger`] that delivers requests straight to a
/// [`Coordinator`]. Requests round-trip through JSON like they would over
/// `chrome.runtime.sendMessage`.
pub struct LocalBridge {
    coordinator: Rc<Coordinator>,
    alive: Cell<bool>,
}

impl LocalBridge {
    pub fn new(coordinator: Rc<Coordinator>) -> Self {
        Self {
            coordinator,
            alive: Cell::new(true),
        }
    }

    /// Simulate an extension reload: later (and in-flight) calls fail with
    /// [`MessagingError::ContextInvalidated`].
    pub fn invalidate(&self) {
        self.alive.set(false);
    }
}

#[async_trait(?Send)]
impl Messenger for LocalBridge {
    async fn send(&self, request: Request) -> Result<Value, MessagingError> {
        if !self.alive.get() {
            return Err(MessagingError::ContextInvalidated);
        }
        let wire = serde_json::to_value(&request)
            .map_err(|e| MessagingError::Transport(e.to_string()))?;
        let request: Request =
            serde_json::from_value(wire).map_err(|e| MessagingError::Transport(e.to_string()))?;

        let reply = self.coordinator.handle(request).await;
        if !self.alive.get() {
            return Err(MessagingError::ContextInvalidated);
        }
        Ok(reply)
    }
}
