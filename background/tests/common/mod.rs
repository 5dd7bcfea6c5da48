//! Mock of the server's extension API for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shared_types::{Platform, ProblemData};
use tokio::net::TcpListener;

pub const CODE: &str = "code-1";
pub const ACCESS_TOKEN: &str = "access-1";
pub const REFRESHED_TOKEN: &str = "access-2";
pub const REFRESH_TOKEN: &str = "refresh-1";

#[derive(Debug)]
pub struct MockState {
    /// Bearer token the problem routes accept.
    pub valid_token: String,
    pub fail_refresh: bool,
    /// Tracked problems by `platform/slug`.
    pub problems: HashMap<String, ProblemData>,
    pub exchanged_codes: Vec<String>,
    pub refreshes: usize,
    pub lookups: Vec<String>,
    pub patches: Vec<Value>,
    pub attempts: Vec<Value>,
    pub reviews: Vec<Value>,
}

impl Default for MockState {
    fn default() -> Self {
        let mut problems = HashMap::new();
        problems.insert("leetcode/two-sum".to_string(), problem(Platform::Leetcode, "two-sum"));
        Self {
            valid_token: ACCESS_TOKEN.to_string(),
            fail_refresh: false,
            problems,
            exchanged_codes: Vec::new(),
            refreshes: 0,
            lookups: Vec::new(),
            patches: Vec::new(),
            attempts: Vec::new(),
            reviews: Vec::new(),
        }
    }
}

pub type SharedState = Arc<Mutex<MockState>>;

pub fn problem(platform: Platform, slug: &str) -> ProblemData {
    ProblemData {
        id: format!("{platform}-{slug}"),
        platform,
        slug: slug.to_string(),
        title: slug.replace('-', " "),
        difficulty: Some("Easy".to_string()),
        url: None,
        notes: String::new(),
        solution: Some(String::new()),
        next_review_at: Some(Utc::now() + Duration::days(1)),
        review_count: 0,
        interval: 1,
        last_reviewed_at: None,
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: SharedState,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockServer {
    pub fn api_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_root(&self) -> String {
        format!("{}/api/extension", self.api_base())
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

pub async fn start_mock_server() -> MockServer {
    host::logging::init_tracing();
    let state = SharedState::default();
    let app = Router::new()
        .route("/api/extension/token", post(exchange_token))
        .route("/api/extension/refresh", post(refresh_token))
        .route(
            "/api/extension/problems/{platform}/{slug}",
            get(get_problem).patch(patch_problem),
        )
        .route("/api/extension/problems/{platform}/{slug}/review", post(review_problem))
        .route("/api/extension/attempts", post(record_attempt))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("Server failed");
    });

    MockServer {
        addr,
        state,
        handle,
    }
}

fn expires_in_an_hour() -> i64 {
    (Utc::now() + Duration::hours(1)).timestamp_millis()
}

fn authorized(state: &MockState, headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", state.valid_token))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"}))).into_response()
}

async fn exchange_token(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let code = body["code"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().expect("mock state poisoned");
    state.exchanged_codes.push(code.clone());
    if code != CODE {
        return (StatusCode::BAD_REQUEST, "unknown code").into_response();
    }
    Json(json!({
        "accessToken": state.valid_token,
        "refreshToken": REFRESH_TOKEN,
        "expiresAt": expires_in_an_hour(),
        "user": {"name": "Ada Lovelace", "email": "ada@example.com"}
    }))
    .into_response()
}

async fn refresh_token(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().expect("mock state poisoned");
    state.refreshes += 1;
    if state.fail_refresh || body["refreshToken"] != REFRESH_TOKEN {
        return unauthorized();
    }
    state.valid_token = REFRESHED_TOKEN.to_string();
    Json(json!({
        "accessToken": REFRESHED_TOKEN,
        "expiresAt": expires_in_an_hour(),
    }))
    .into_response()
}

async fn get_problem(
    State(state): State<SharedState>,
    Path((platform, slug)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().expect("mock state poisoned");
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let key = format!("{platform}/{slug}");
    state.lookups.push(key.clone());
    match state.problems.get(&key) {
        Some(problem) => Json(json!({"tracked": true, "problem": problem})).into_response(),
        None => Json(json!({"tracked": false})).into_response(),
    }
}

async fn patch_problem(
    State(state): State<SharedState>,
    Path((platform, slug)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("mock state poisoned");
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.patches.push(body.clone());
    let Some(problem) = state.problems.get_mut(&format!("{platform}/{slug}")) else {
        return (StatusCode::NOT_FOUND, "not tracked").into_response();
    };
    if let Some(notes) = body["notes"].as_str() {
        problem.notes = notes.to_string();
    }
    if let Some(solution) = body["solution"].as_str() {
        problem.solution = Some(solution.to_string());
    }
    Json(json!({"problem": problem})).into_response()
}

async fn review_problem(
    State(state): State<SharedState>,
    Path((platform, slug)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("mock state poisoned");
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.reviews.push(body);
    let Some(problem) = state.problems.get_mut(&format!("{platform}/{slug}")) else {
        return (StatusCode::NOT_FOUND, "not tracked").into_response();
    };
    problem.review_count += 1;
    problem.last_reviewed_at = Some(Utc::now());
    Json(json!({"problem": problem})).into_response()
}

async fn record_attempt(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("mock state poisoned");
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    state.attempts.push(body.clone());
    let (Some(platform), Some(slug)) = (
        body["platform"]
            .as_str()
            .and_then(|p| serde_json::from_value::<Platform>(json!(p)).ok()),
        body["slug"].as_str(),
    ) else {
        return (StatusCode::BAD_REQUEST, "missing problem").into_response();
    };
    let problem = state
        .problems
        .entry(format!("{platform}/{slug}"))
        .or_insert_with(|| self::problem(platform, slug))
        .clone();
    Json(json!({"problem": problem})).into_response()
}
