//! Client for the server's extension API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{AttemptRecord, AuthSession, ProblemContext, ProblemData, ReviewProblem};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server rejected the access token (HTTP 401).
    #[error("TOKEN_EXPIRED")]
    TokenExpired,

    #[error("{operation} failed: HTTP {status} {detail}")]
    Status {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("Request failed: {0}")]
    Network(String),

    #[error("Failed to parse JSON: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// New access token issued by `POST /refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProblemLookup {
    #[serde(default)]
    pub tracked: bool,
    #[serde(default)]
    pub problem: Option<ProblemData>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProblemEnvelope {
    #[serde(default)]
    pub problem: Option<ProblemData>,
}

#[derive(Debug, Clone, Serialize)]
struct CodeExchange<'a> {
    code: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ProblemPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReviewBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<shared_types::Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_spent_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_event_id: Option<&'a str>,
}

/// Server endpoints used by the background. Authenticated calls take the
/// bearer token explicitly; token validity is the caller's concern.
#[async_trait(?Send)]
pub trait ServerApi {
    async fn exchange_code(&self, code: &str) -> Result<AuthSession, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError>;

    async fn get_problem(
        &self,
        token: &str,
        problem: &ProblemContext,
    ) -> Result<ProblemLookup, ApiError>;

    async fn save_problem(
        &self,
        token: &str,
        problem: &ProblemContext,
        notes: Option<&str>,
        solution: Option<&str>,
    ) -> Result<ProblemEnvelope, ApiError>;

    async fn save_attempt(
        &self,
        token: &str,
        attempt: &AttemptRecord,
    ) -> Result<ProblemEnvelope, ApiError>;

    async fn review_problem(
        &self,
        token: &str,
        review: &ReviewProblem,
    ) -> Result<ProblemEnvelope, ApiError>;
}

/// `reqwest` implementation against `{api_base}/api/extension`.
#[derive(Debug, Clone)]
pub struct HttpServerApi {
    root: Url,
    http: reqwest::Client,
}

impl HttpServerApi {
    pub fn new(api_root: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            root: Url::parse(api_root)?,
            http: reqwest::Client::new(),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Network(format!("cannot build path on {}", self.root)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn problem_endpoint(&self, problem: &ProblemContext, tail: &[&str]) -> Result<Url, ApiError> {
        let mut segments = vec!["problems", problem.platform.as_str(), problem.slug.as_str()];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::TokenExpired);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            operation,
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait(?Send)]
impl ServerApi for HttpServerApi {
    async fn exchange_code(&self, code: &str) -> Result<AuthSession, ApiError> {
        let response = self
            .http
            .post(self.endpoint(&["token"])?)
            .json(&CodeExchange { code })
            .send()
            .await?;
        let response = Self::ensure_success(response, "token exchange").await?;
        Ok(response.json::<AuthSession>().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken, ApiError> {
        let response = self
            .http
            .post(self.endpoint(&["refresh"])?)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let response = Self::ensure_success(response, "token refresh").await?;
        Ok(response.json::<RefreshedToken>().await?)
    }

    async fn get_problem(
        &self,
        token: &str,
        problem: &ProblemContext,
    ) -> Result<ProblemLookup, ApiError> {
        let response = self
            .http
            .get(self.problem_endpoint(problem, &[])?)
            .bearer_auth(token)
            .send()
            .await?;
        let response = Self::ensure_success(response, "problem lookup").await?;
        Ok(response.json::<ProblemLookup>().await?)
    }

    async fn save_problem(
        &self,
        token: &str,
        problem: &ProblemContext,
        notes: Option<&str>,
        solution: Option<&str>,
    ) -> Result<ProblemEnvelope, ApiError> {
        let response = self
            .http
            .patch(self.problem_endpoint(problem, &[])?)
            .bearer_auth(token)
            .json(&ProblemPatch { notes, solution })
            .send()
            .await?;
        let response = Self::ensure_success(response, "problem save").await?;
        Ok(response.json::<ProblemEnvelope>().await?)
    }

    async fn save_attempt(
        &self,
        token: &str,
        attempt: &AttemptRecord,
    ) -> Result<ProblemEnvelope, ApiError> {
        let response = self
            .http
            .post(self.endpoint(&["attempts"])?)
            .bearer_auth(token)
            .json(attempt)
            .send()
            .await?;
        let response = Self::ensure_success(response, "attempt save").await?;
        Ok(response.json::<ProblemEnvelope>().await?)
    }

    async fn review_problem(
        &self,
        token: &str,
        review: &ReviewProblem,
    ) -> Result<ProblemEnvelope, ApiError> {
        let problem = ProblemContext::new(review.platform, review.slug.clone());
        let response = self
            .http
            .post(self.problem_endpoint(&problem, &["review"])?)
            .bearer_auth(token)
            .json(&ReviewBody {
                rating: review.rating,
                time_spent_ms: review.time_spent_ms,
                client_event_id: review.client_event_id.as_deref(),
            })
            .send()
            .await?;
        let response = Self::ensure_success(response, "review").await?;
        Ok(response.json::<ProblemEnvelope>().await?)
    }
}
