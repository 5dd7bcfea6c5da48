//! Access token lifecycle: validity check, refresh, revocation.

use std::rc::Rc;

use chrono::Duration;
use host::{Clock, HostError};
use shared_types::AuthSession;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ServerApi;
use crate::session::SessionStore;

pub struct TokenManager {
    sessions: SessionStore,
    api: Rc<dyn ServerApi>,
    clock: Rc<dyn Clock>,
    buffer: Duration,
    /// Held across a refresh so concurrent callers share one server round-trip.
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        sessions: SessionStore,
        api: Rc<dyn ServerApi>,
        clock: Rc<dyn Clock>,
        buffer: Duration,
    ) -> Self {
        Self {
            sessions,
            api,
            clock,
            buffer,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Access token usable right now, refreshing it first when it is inside
    /// the expiry buffer. `None` means the user must reconnect; a failed
    /// refresh deletes the session.
    ///
    /// Only storage failures are errors.
    pub async fn get_valid_access_token(&self) -> Result<Option<String>, HostError> {
        let Some(session) = self.sessions.load().await? else {
            return Ok(None);
        };
        if session.is_usable(self.clock.now(), self.buffer) {
            return Ok(Some(session.access_token));
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed (or revoked) while we waited.
        let Some(session) = self.sessions.load().await? else {
            return Ok(None);
        };
        if session.is_usable(self.clock.now(), self.buffer) {
            debug!("access token refreshed by a concurrent caller");
            return Ok(Some(session.access_token));
        }

        self.refresh(session).await
    }

    async fn refresh(&self, session: AuthSession) -> Result<Option<String>, HostError> {
        debug!(expires_at = %session.expires_at, "refreshing access token");
        let refreshed = match self.api.refresh(&session.refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing session");
                self.sessions.clear().await?;
                return Ok(None);
            }
        };

        let updated = session.refreshed(refreshed.access_token, refreshed.expires_at);
        if !updated.is_usable(self.clock.now(), self.buffer) {
            warn!(
                expires_at = %updated.expires_at,
                "refreshed token already inside expiry buffer, clearing session"
            );
            self.sessions.clear().await?;
            return Ok(None);
        }

        self.sessions.save(&updated).await?;
        info!(expires_at = %updated.expires_at, "access token refreshed");
        Ok(Some(updated.access_token))
    }

    /// Drop the session after the server rejected `rejected`. A session
    /// refreshed meanwhile is kept; returns whether anything was cleared.
    pub async fn revoke(&self, rejected: &str) -> Result<bool, HostError> {
        let _guard = self.refresh_lock.lock().await;
        match self.sessions.load().await? {
            Some(session) if session.access_token == rejected => {
                self.sessions.clear().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
