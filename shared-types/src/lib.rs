//! Shared types between the extension contexts
//!
//! These types are used by:
//! - the background coordinator (owns the session, talks to the server)
//! - the content runtime (overlay injected into problem pages)
//! - the popup
//!
//! Everything here crosses a context boundary as JSON, either through
//! `chrome.runtime.sendMessage` or through `chrome.storage.local`.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Storage Keys
// ============================================================================

/// Persisted [`AuthSession`]. Only the background coordinator writes it.
pub const STORAGE_KEY_SESSION: &str = "revu_auth_session";

/// One-shot OAuth nonce, removed on first read by the callback handler.
pub const STORAGE_KEY_OAUTH_STATE: &str = "revu_oauth_state";

/// Last dropped overlay position, shared by every page of the installation.
pub const STORAGE_KEY_OVERLAY_POSITION: &str = "revu_overlay_position";

/// Sessions are treated as expired this long before `expires_at`.
pub const SESSION_EXPIRY_BUFFER_MS: i64 = 60_000;

// ============================================================================
// Session
// ============================================================================

/// Cached profile of the connected account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct SessionUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SessionUser {
    /// Best human-readable label: name, then username, then email.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.email.as_deref())
    }
}

/// Access/refresh token pair plus the cached user profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[ts(type = "number")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
}

impl AuthSession {
    /// A session is usable only while `now < expires_at - buffer`.
    pub fn is_usable(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now < self.expires_at - buffer
    }

    /// Replace the access token after a refresh, keeping refresh token and user.
    pub fn refreshed(&self, access_token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            refresh_token: self.refresh_token.clone(),
            expires_at,
            user: self.user.clone(),
        }
    }
}

// ============================================================================
// Problems
// ============================================================================

/// Coding sites the overlay knows how to read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub enum Platform {
    Leetcode,
    Codeforces,
    Atcoder,
    Hackerrank,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Leetcode,
        Platform::Codeforces,
        Platform::Atcoder,
        Platform::Hackerrank,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Leetcode => "leetcode",
            Platform::Codeforces => "codeforces",
            Platform::Atcoder => "atcoder",
            Platform::Hackerrank => "hackerrank",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which problem the current page represents. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct ProblemContext {
    pub platform: Platform,
    pub slug: String,
}

impl ProblemContext {
    pub fn new(platform: Platform, slug: impl Into<String>) -> Self {
        Self {
            platform,
            slug: slug.into(),
        }
    }
}

impl std::fmt::Display for ProblemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.platform, self.slug)
    }
}

/// Server-side state of a tracked problem, as shown in the overlay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct ProblemData {
    pub id: String,
    pub platform: Platform,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: String,
    /// `None` means hidden by user settings; `Some("")` means not written yet.
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub next_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_count: u32,
    /// Current scheduling interval in days.
    #[serde(default)]
    pub interval: u32,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl ProblemData {
    pub fn context(&self) -> ProblemContext {
        ProblemContext::new(self.platform, self.slug.clone())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at.is_some_and(|at| at <= now)
    }
}

/// Self-assessed recall quality attached to a review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        }
    }
}

/// Attempt that starts (or updates) tracking of a problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct AttemptRecord {
    pub platform: Platform,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub solved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_ms: Option<u64>,
}

/// Overlay bubble offset in CSS pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct OverlayPosition {
    pub x: f64,
    pub y: f64,
}

// ============================================================================
// Messaging Protocol
// ============================================================================

/// Every message a content script or the popup may send to the background.
///
/// Adding a variant forces the background dispatcher to handle it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub enum Request {
    GetAuthStatus,
    GetProblem(GetProblem),
    SaveProblem(SaveProblem),
    SaveAttempt(AttemptRecord),
    ReviewProblem(ReviewProblem),
    Connect,
    Disconnect,
}

impl Request {
    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetAuthStatus => "GET_AUTH_STATUS",
            Request::GetProblem(_) => "GET_PROBLEM",
            Request::SaveProblem(_) => "SAVE_PROBLEM",
            Request::SaveAttempt(_) => "SAVE_ATTEMPT",
            Request::ReviewProblem(_) => "REVIEW_PROBLEM",
            Request::Connect => "CONNECT",
            Request::Disconnect => "DISCONNECT",
        }
    }
}

/// Binds a request to its single response shape.
pub trait Exchange: Into<Request> {
    type Response: Serialize + DeserializeOwned;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAuthStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct GetProblem {
    pub platform: Platform,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct SaveProblem {
    pub platform: Platform,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct ReviewProblem {
    pub platform: Platform,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_event_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect;

impl From<GetAuthStatus> for Request {
    fn from(_: GetAuthStatus) -> Self {
        Request::GetAuthStatus
    }
}

impl From<GetProblem> for Request {
    fn from(req: GetProblem) -> Self {
        Request::GetProblem(req)
    }
}

impl From<SaveProblem> for Request {
    fn from(req: SaveProblem) -> Self {
        Request::SaveProblem(req)
    }
}

impl From<AttemptRecord> for Request {
    fn from(req: AttemptRecord) -> Self {
        Request::SaveAttempt(req)
    }
}

impl From<ReviewProblem> for Request {
    fn from(req: ReviewProblem) -> Self {
        Request::ReviewProblem(req)
    }
}

impl From<Connect> for Request {
    fn from(_: Connect) -> Self {
        Request::Connect
    }
}

impl From<Disconnect> for Request {
    fn from(_: Disconnect) -> Self {
        Request::Disconnect
    }
}

impl Exchange for GetAuthStatus {
    type Response = AuthStatusResponse;
}

impl Exchange for GetProblem {
    type Response = GetProblemResponse;
}

impl Exchange for SaveProblem {
    type Response = SaveProblemResponse;
}

impl Exchange for AttemptRecord {
    type Response = SaveAttemptResponse;
}

impl Exchange for ReviewProblem {
    type Response = ReviewProblemResponse;
}

impl Exchange for Connect {
    type Response = ConnectResponse;
}

impl Exchange for Disconnect {
    type Response = DisconnectResponse;
}

// Every response also decodes the `{success: false, error}` envelope the
// background returns when a handler fails, so all fields default.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct AuthStatusResponse {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct GetProblemResponse {
    #[serde(default)]
    pub tracked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GetProblemResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            tracked: false,
            problem: None,
            error: Some(error.into()),
        }
    }
}

/// Shape shared by the write requests (save, attempt, review).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct MutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<ProblemData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MutationResponse {
    pub fn ok(problem: Option<ProblemData>) -> Self {
        Self {
            success: true,
            problem,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            problem: None,
            error: Some(error.into()),
        }
    }
}

pub type SaveProblemResponse = MutationResponse;
pub type SaveAttemptResponse = MutationResponse;
pub type ReviewProblemResponse = MutationResponse;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, TS)]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub struct ConnectResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub type DisconnectResponse = ConnectResponse;

/// Envelope for a handler that failed before producing its typed response.
pub fn failure_envelope(error: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "error": error.into(),
    })
}

/// Messages the web app pushes through `externally_connectable`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "../../extension/src/types/generated.ts")]
pub enum ExternalMessage {
    AuthSuccess { session: AuthSession },
}

// ============================================================================
// Error Codes
// ============================================================================

/// Stable error strings carried in `error` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotAuthenticated,
    TokenExpired,
    ExtensionContextInvalid,
    StateMismatch,
    Abort,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotAuthenticated => "NOT_AUTHENTICATED",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::ExtensionContextInvalid => "EXTENSION_CONTEXT_INVALID",
            ErrorCode::StateMismatch => "STATE_MISMATCH",
            ErrorCode::Abort => "ABORT",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "NOT_AUTHENTICATED" => Some(ErrorCode::NotAuthenticated),
            "TOKEN_EXPIRED" => Some(ErrorCode::TokenExpired),
            "EXTENSION_CONTEXT_INVALID" => Some(ErrorCode::ExtensionContextInvalid),
            "STATE_MISMATCH" => Some(ErrorCode::StateMismatch),
            "ABORT" => Some(ErrorCode::Abort),
            _ => None,
        }
    }

    /// Errors that mean "show the connect prompt".
    pub fn is_auth(&self) -> bool {
        matches!(self, ErrorCode::NotAuthenticated | ErrorCode::TokenExpired)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when a response `error` field carries an authentication failure.
pub fn is_auth_error(error: &str) -> bool {
    ErrorCode::parse(error).is_some_and(|code| code.is_auth())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ts_rs::Config;

    fn session_expiring_at(ms: i64) -> AuthSession {
        AuthSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc.timestamp_millis_opt(ms).unwrap(),
            user: Some(SessionUser {
                username: Some("ada".to_string()),
                email: Some("ada@example.com".to_string()),
                image: None,
                name: Some("Ada".to_string()),
            }),
        }
    }

    #[test]
    fn test_request_tags() {
        let json = serde_json::to_value(Request::GetAuthStatus).unwrap();
        assert_eq!(json, serde_json::json!({"type": "GET_AUTH_STATUS"}));

        let json = serde_json::to_value(Request::from(GetProblem {
            platform: Platform::Leetcode,
            slug: "two-sum".to_string(),
        }))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "GET_PROBLEM", "platform": "leetcode", "slug": "two-sum"})
        );
    }

    #[test]
    fn test_review_request_is_camel_case() {
        let request = Request::from(ReviewProblem {
            platform: Platform::Codeforces,
            slug: "1500-C".to_string(),
            rating: Some(Rating::Good),
            time_spent_ms: Some(1_200),
            client_event_id: Some("evt-1".to_string()),
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "REVIEW_PROBLEM");
        assert_eq!(json["timeSpentMs"], 1_200);
        assert_eq!(json["clientEventId"], "evt-1");
        assert_eq!(json["rating"], "good");

        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
        assert_eq!(back.kind(), "REVIEW_PROBLEM");
    }

    #[test]
    fn test_failure_envelope_decodes_into_every_response() {
        let envelope = failure_envelope("boom");

        let status: AuthStatusResponse = serde_json::from_value(envelope.clone()).unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.error.as_deref(), Some("boom"));

        let problem: GetProblemResponse = serde_json::from_value(envelope.clone()).unwrap();
        assert!(!problem.tracked);
        assert_eq!(problem.error.as_deref(), Some("boom"));

        let saved: MutationResponse = serde_json::from_value(envelope.clone()).unwrap();
        assert!(!saved.success);

        let connect: ConnectResponse = serde_json::from_value(envelope).unwrap();
        assert_eq!(connect.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_session_expiry_uses_epoch_millis() {
        let session = session_expiring_at(1_700_000_000_000);
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["expiresAt"], 1_700_000_000_000_i64);
        assert_eq!(json["accessToken"], "access");

        let back: AuthSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_session_usable_window() {
        let session = session_expiring_at(100_000);
        let buffer = Duration::milliseconds(SESSION_EXPIRY_BUFFER_MS);

        let early = Utc.timestamp_millis_opt(30_000).unwrap();
        let inside_buffer = Utc.timestamp_millis_opt(70_000).unwrap();
        assert!(session.is_usable(early, buffer));
        assert!(!session.is_usable(inside_buffer, buffer));
    }

    #[test]
    fn test_refreshed_keeps_refresh_token_and_user() {
        let session = session_expiring_at(100_000);
        let expires = Utc.timestamp_millis_opt(500_000).unwrap();
        let next = session.refreshed("access-2".to_string(), expires);
        assert_eq!(next.access_token, "access-2");
        assert_eq!(next.refresh_token, "refresh");
        assert_eq!(next.user, session.user);
        assert_eq!(next.expires_at, expires);
    }

    #[test]
    fn test_problem_due() {
        let now = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let mut problem: ProblemData = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "platform": "leetcode",
            "slug": "two-sum",
            "title": "Two Sum",
        }))
        .unwrap();
        assert!(!problem.is_due(now));
        assert_eq!(problem.solution, None);

        problem.next_review_at = Some(now);
        assert!(problem.is_due(now));
    }

    #[test]
    fn test_error_codes() {
        assert!(is_auth_error("NOT_AUTHENTICATED"));
        assert!(is_auth_error("TOKEN_EXPIRED"));
        assert!(!is_auth_error("STATE_MISMATCH"));
        assert!(!is_auth_error("network down"));
        assert_eq!(
            ErrorCode::parse(ErrorCode::ExtensionContextInvalid.as_str()),
            Some(ErrorCode::ExtensionContextInvalid)
        );
    }

    #[test]
    fn test_external_message_protocol() {
        let json = serde_json::json!({
            "type": "AUTH_SUCCESS",
            "session": {
                "accessToken": "a",
                "refreshToken": "r",
                "expiresAt": 1_000,
            }
        });
        let msg: ExternalMessage = serde_json::from_value(json).unwrap();
        let ExternalMessage::AuthSuccess { session } = msg;
        assert_eq!(session.access_token, "a");
        assert!(session.user.is_none());
    }

    #[test]
    fn export_types() {
        // Export all types to TypeScript for the extension's JS glue
        let config = Config::default();
        SessionUser::export(&config).unwrap();
        AuthSession::export(&config).unwrap();
        Platform::export(&config).unwrap();
        ProblemContext::export(&config).unwrap();
        ProblemData::export(&config).unwrap();
        Rating::export(&config).unwrap();
        AttemptRecord::export(&config).unwrap();
        OverlayPosition::export(&config).unwrap();
        Request::export(&config).unwrap();
        GetProblem::export(&config).unwrap();
        SaveProblem::export(&config).unwrap();
        ReviewProblem::export(&config).unwrap();
        AuthStatusResponse::export(&config).unwrap();
        GetProblemResponse::export(&config).unwrap();
        MutationResponse::export(&config).unwrap();
        ConnectResponse::export(&config).unwrap();
        ExternalMessage::export(&config).unwrap();
    }
}
