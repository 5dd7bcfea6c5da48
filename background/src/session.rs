use std::rc::Rc;

use host::storage::{load, store};
use host::{HostError, StorageArea};
use serde_json::Value;
use shared_types::{AuthSession, STORAGE_KEY_OAUTH_STATE, STORAGE_KEY_SESSION};
use tracing::warn;

/// Persistent home of the auth session and the pending OAuth nonce.
///
/// The background is the only writer. Other contexts observe the session key
/// through storage change notifications.
#[derive(Clone)]
pub struct SessionStore {
    storage: Rc<dyn StorageArea>,
}

impl SessionStore {
    pub fn new(storage: Rc<dyn StorageArea>) -> Self {
        Self { storage }
    }

    /// Stored session, if any. A value that no longer decodes is discarded.
    pub async fn load(&self) -> Result<Option<AuthSession>, HostError> {
        match load::<AuthSession>(self.storage.as_ref(), STORAGE_KEY_SESSION).await {
            Err(HostError::Decode { message, .. }) => {
                warn!(error = %message, "discarding unreadable auth session");
                self.clear().await?;
                Ok(None)
            }
            other => other,
        }
    }

    pub async fn save(&self, session: &AuthSession) -> Result<(), HostError> {
        store(self.storage.as_ref(), STORAGE_KEY_SESSION, session).await
    }

    pub async fn clear(&self) -> Result<(), HostError> {
        self.storage.remove(STORAGE_KEY_SESSION).await
    }

    pub async fn put_nonce(&self, nonce: &str) -> Result<(), HostError> {
        self.storage
            .set(STORAGE_KEY_OAUTH_STATE, Value::String(nonce.to_string()))
            .await
    }

    /// Read and delete the pending nonce. A second call returns `None`.
    pub async fn take_nonce(&self) -> Result<Option<String>, HostError> {
        Ok(self
            .storage
            .take(STORAGE_KEY_OAUTH_STATE)
            .await?
            .and_then(|value| value.as_str().map(ToString::to_string)))
    }
}
