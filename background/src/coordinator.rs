//! Background request dispatch and the connect handshake.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;
use std::rc::Rc;

use host::{Clock, StorageArea, TabId, Tabs};
use serde_json::Value;
use shared_types::{
    failure_envelope, AttemptRecord, AuthSession, AuthStatusResponse, ConnectResponse,
    DisconnectResponse, ErrorCode, ExternalMessage, GetProblem, GetProblemResponse,
    MutationResponse, ProblemContext, Request, ReviewProblem, SaveProblem,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ServerApi};
use crate::config::Config;
use crate::error::Result;
use crate::oauth::{self, CallbackParams};
use crate::session::SessionStore;
use crate::tokens::TokenManager;

/// What a tab navigation did to the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Not the callback route.
    Ignored,
    /// Callback carried `error` or no `code`.
    Rejected(String),
    /// Code already exchanged by this coordinator.
    Duplicate,
    StateMismatch,
    /// Code exchange or persistence failed.
    Failed(String),
    Connected,
}

enum Authorized<T> {
    Granted(T),
    Denied,
}

/// Owner of the auth session. Everything else reaches it through [`Request`]s.
pub struct Coordinator {
    config: Config,
    sessions: SessionStore,
    tokens: TokenManager,
    api: Rc<dyn ServerApi>,
    tabs: Rc<dyn Tabs>,
    callback_lock: Mutex<()>,
    exchanged_codes: RefCell<HashSet<String>>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        storage: Rc<dyn StorageArea>,
        api: Rc<dyn ServerApi>,
        tabs: Rc<dyn Tabs>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let sessions = SessionStore::new(storage);
        let tokens = TokenManager::new(sessions.clone(), api.clone(), clock, config.refresh_buffer);
        Self {
            config,
            sessions,
            tokens,
            api,
            tabs,
            callback_lock: Mutex::new(()),
            exchanged_codes: RefCell::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer one request. Never fails: handler errors become
    /// `{success: false, error}`.
    pub async fn handle(&self, request: Request) -> Value {
        let kind = request.kind();
        match self.dispatch(request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(kind, error = %e, "request handler failed");
                failure_envelope(e.to_string())
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value> {
        let reply = match request {
            Request::GetAuthStatus => serde_json::to_value(self.auth_status().await?)?,
            Request::GetProblem(req) => serde_json::to_value(self.get_problem(req).await?)?,
            Request::SaveProblem(req) => serde_json::to_value(self.save_problem(req).await?)?,
            Request::SaveAttempt(req) => serde_json::to_value(self.save_attempt(req).await?)?,
            Request::ReviewProblem(req) => serde_json::to_value(self.review_problem(req).await?)?,
            Request::Connect => serde_json::to_value(self.connect().await?)?,
            Request::Disconnect => serde_json::to_value(self.disconnect().await?)?,
        };
        Ok(reply)
    }

    /// Run `call` with a valid access token. A 401 from the server revokes
    /// the session and reads as "not authenticated", unless the token was
    /// rotated while the call was in flight; then the call is retried once.
    async fn authorized<T, F, Fut>(&self, call: F) -> Result<Authorized<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, ApiError>>,
    {
        let mut retried = false;
        loop {
            let Some(token) = self.tokens.get_valid_access_token().await? else {
                return Ok(Authorized::Denied);
            };
            match call(token.clone()).await {
                Ok(value) => return Ok(Authorized::Granted(value)),
                Err(ApiError::TokenExpired) => {
                    if self.tokens.revoke(&token).await? {
                        warn!("server rejected access token, session cleared");
                        return Ok(Authorized::Denied);
                    }
                    if retried {
                        warn!("server rejected rotated access token");
                        return Ok(Authorized::Denied);
                    }
                    debug!("access token rotated during request, retrying");
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn auth_status(&self) -> Result<AuthStatusResponse> {
        if self.tokens.get_valid_access_token().await?.is_none() {
            return Ok(AuthStatusResponse::default());
        }
        let user = self.sessions.load().await?.and_then(|s| s.user);
        Ok(AuthStatusResponse {
            authenticated: true,
            user,
            error: None,
        })
    }

    async fn get_problem(&self, req: GetProblem) -> Result<GetProblemResponse> {
        let problem = ProblemContext::new(req.platform, req.slug);
        debug!(platform = %problem.platform, slug = %problem.slug, "looking up problem");

        let target = &problem;
        let lookup = self
            .authorized(|token| async move { self.api.get_problem(&token, target).await })
            .await?;
        Ok(match lookup {
            Authorized::Granted(lookup) => GetProblemResponse {
                tracked: lookup.tracked && lookup.problem.is_some(),
                problem: lookup.problem,
                error: None,
            },
            Authorized::Denied => GetProblemResponse::failed(ErrorCode::NotAuthenticated.as_str()),
        })
    }

    async fn save_problem(&self, req: SaveProblem) -> Result<MutationResponse> {
        let problem = ProblemContext::new(req.platform, req.slug.clone());
        debug!(platform = %problem.platform, slug = %problem.slug, "saving problem");

        let (target, notes, solution) = (&problem, req.notes.as_deref(), req.solution.as_deref());
        let saved = self
            .authorized(|token| async move {
                self.api.save_problem(&token, target, notes, solution).await
            })
            .await?;
        Ok(mutation(saved))
    }

    async fn save_attempt(&self, attempt: AttemptRecord) -> Result<MutationResponse> {
        debug!(platform = %attempt.platform, slug = %attempt.slug, solved = attempt.solved, "saving attempt");

        let record = &attempt;
        let saved = self
            .authorized(|token| async move { self.api.save_attempt(&token, record).await })
            .await?;
        Ok(mutation(saved))
    }

    async fn review_problem(&self, review: ReviewProblem) -> Result<MutationResponse> {
        debug!(
            platform = %review.platform,
            slug = %review.slug,
            time_spent_ms = ?review.time_spent_ms,
            "submitting review"
        );

        let submitted = &review;
        let reviewed = self
            .authorized(|token| async move { self.api.review_problem(&token, submitted).await })
            .await?;
        Ok(mutation(reviewed))
    }

    async fn connect(&self) -> Result<ConnectResponse> {
        let nonce = oauth::generate_state();
        self.sessions.put_nonce(&nonce).await?;
        let url = self.config.connect_url(&nonce)?;
        let tab_id = self.tabs.open(url.as_str()).await?;
        info!(tab_id, "opened connect tab");
        Ok(ConnectResponse {
            success: true,
            error: None,
        })
    }

    async fn disconnect(&self) -> Result<DisconnectResponse> {
        self.sessions.clear().await?;
        info!("extension disconnected");
        Ok(DisconnectResponse {
            success: true,
            error: None,
        })
    }

    /// Watch a tab navigation for the callback route and finish the handshake.
    pub async fn on_tab_updated(&self, tab_id: TabId, url: &str) -> CallbackOutcome {
        let Some(params) = oauth::parse_callback(&self.config, url) else {
            return CallbackOutcome::Ignored;
        };

        // One callback at a time, so the nonce is consumed at most once.
        let _guard = self.callback_lock.lock().await;
        match self.complete_callback(tab_id, params).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(tab_id, error = %e, "connect callback failed");
                CallbackOutcome::Failed(e.to_string())
            }
        }
    }

    async fn complete_callback(&self, tab_id: TabId, params: CallbackParams) -> Result<CallbackOutcome> {
        if let Some(error) = params.error {
            warn!(tab_id, error = %error, "connect callback returned an error");
            return Ok(CallbackOutcome::Rejected(error));
        }
        let Some(code) = params.code else {
            warn!(tab_id, "connect callback without code");
            return Ok(CallbackOutcome::Rejected("missing code".to_string()));
        };
        if self.exchanged_codes.borrow().contains(&code) {
            debug!(tab_id, "ignoring already exchanged code");
            return Ok(CallbackOutcome::Duplicate);
        }

        match (self.sessions.take_nonce().await?, params.state.as_deref()) {
            (Some(expected), received) if received != Some(expected.as_str()) => {
                warn!(tab_id, code = ErrorCode::StateMismatch.as_str(), "connect state mismatch, aborting");
                return Ok(CallbackOutcome::StateMismatch);
            }
            (None, _) if self.config.strict_state => {
                warn!(tab_id, "connect callback without a pending nonce, aborting");
                return Ok(CallbackOutcome::StateMismatch);
            }
            (None, _) => debug!(tab_id, "no pending nonce, accepting web-initiated connect"),
            (Some(_), _) => {}
        }

        self.exchanged_codes.borrow_mut().insert(code.clone());
        let session = self.api.exchange_code(&code).await?;
        self.establish_session(&session).await?;

        if let Err(e) = self.tabs.close(tab_id).await {
            warn!(tab_id, error = %e, "failed to close callback tab");
        }
        Ok(CallbackOutcome::Connected)
    }

    /// Session pushed by the web app through `externally_connectable`.
    pub async fn on_external_message(&self, origin: &str, message: ExternalMessage) -> ConnectResponse {
        if !self.config.allows_external_origin(origin) {
            warn!(origin, "rejecting external message from unknown origin");
            return ConnectResponse {
                success: false,
                error: Some("origin not allowed".to_string()),
            };
        }

        let ExternalMessage::AuthSuccess { session } = message;
        match self.establish_session(&session).await {
            Ok(()) => ConnectResponse {
                success: true,
                error: None,
            },
            Err(e) => {
                error!(origin, error = %e, "failed to store pushed session");
                ConnectResponse {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Persist a new session. The storage write is what other contexts observe.
    async fn establish_session(&self, session: &AuthSession) -> Result<()> {
        self.sessions.save(session).await?;
        let user = session.user.as_ref().and_then(|u| u.display_name()).unwrap_or("unknown");
        info!(user, "extension connected");
        Ok(())
    }
}

fn mutation(result: Authorized<crate::api::ProblemEnvelope>) -> MutationResponse {
    match result {
        Authorized::Granted(envelope) => MutationResponse::ok(envelope.problem),
        Authorized::Denied => MutationResponse::failed(ErrorCode::NotAuthenticated.as_str()),
    }
}
