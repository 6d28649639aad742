//! HTTP client for the grading backend.
//!
//! One method per backend route. The bearer token is held per client
//! instance and attached to each outgoing request, so independent store
//! instances never share credentials.

use std::time::Duration;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Class, School};

use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Payload for `POST /classes`.
#[derive(Debug, Serialize)]
pub struct NewClass<'a> {
    #[serde(rename = "schoolYear")]
    pub school_year: &'a str,
    pub label: &'a str,
    #[serde(rename = "schoolId")]
    pub school_id: &'a str,
}

/// Payload for `POST /classes/{id}/students`.
#[derive(Debug, Serialize)]
pub struct NewStudent<'a> {
    #[serde(rename = "firstName")]
    pub first_name: &'a str,
    #[serde(rename = "lastName")]
    pub last_name: &'a str,
}

/// API client for the grading backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token attached to subsequent requests.
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Drop the bearer token; subsequent requests go out unauthenticated.
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn performance_path(class_id: &str, sp_id: &str, leaf: &str) -> String {
        format!(
            "/classes/{}/studentsPerformance/{}/{}",
            class_id, sp_id, leaf
        )
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidResponse(format!("invalid token header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning a classified error if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Check if response is successful, returning a classified error if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying with exponential backoff while the backend
    /// answers 429. `build` produces a fresh builder per attempt.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response, ApiError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().headers(self.auth_headers()?).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|| self.client.get(&url)).await?;
        Ok(response.json().await?)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|| self.client.post(&url).json(body)).await?;
        Ok(response.json().await?)
    }

    async fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = self.url(path);
        self.execute(|| self.client.post(&url).json(body)).await?;
        Ok(())
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self.execute(|| self.client.delete(&url)).await?;
        Ok(response.json().await?)
    }

    async fn delete_unit(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        self.execute(|| self.client.delete(&url)).await?;
        Ok(())
    }

    // ===== Collections =====

    /// Fetch the full class collection.
    pub async fn fetch_classes(&self) -> Result<Vec<Class>, ApiError> {
        self.get("/classes").await
    }

    /// Fetch a single class. The backend answers `null` for unknown ids;
    /// that (or an empty body) maps to `None`.
    pub async fn fetch_class(&self, id: &str) -> Result<Option<Class>, ApiError> {
        let url = self.url(&format!("/classes/{}", id));
        let response = self.execute(|| self.client.get(&url)).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Option<Class>>(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("class {}: {}", id, e)))
    }

    /// Fetch the full school collection.
    pub async fn fetch_schools(&self) -> Result<Vec<School>, ApiError> {
        self.get("/schools").await
    }

    // ===== Structural mutations =====

    pub async fn create_class(&self, new: &NewClass<'_>) -> Result<Class, ApiError> {
        self.post("/classes", new).await
    }

    pub async fn delete_class(&self, id: &str) -> Result<(), ApiError> {
        self.delete_unit(&format!("/classes/{}", id)).await
    }

    pub async fn add_student(
        &self,
        class_id: &str,
        new: &NewStudent<'_>,
    ) -> Result<(), ApiError> {
        self.post_unit(&format!("/classes/{}/students", class_id), new)
            .await
    }

    pub async fn delete_student_performance(
        &self,
        class_id: &str,
        sp_id: &str,
    ) -> Result<(), ApiError> {
        self.delete_unit(&format!(
            "/classes/{}/studentsPerformance/{}",
            class_id, sp_id
        ))
        .await
    }

    // ===== Performance sub-resources =====
    //
    // Each returns the full updated class aggregate; the store decides
    // whether to use it (authoritative mode) or discard it (optimistic).

    pub async fn add_activity_score(
        &self,
        class_id: &str,
        sp_id: &str,
        score: i64,
    ) -> Result<Class, ApiError> {
        debug!(class = class_id, performance = sp_id, score, "Posting activity score");
        self.post(
            &Self::performance_path(class_id, sp_id, "activityScores"),
            &serde_json::json!({ "score": score }),
        )
        .await
    }

    pub async fn delete_activity_score(
        &self,
        class_id: &str,
        sp_id: &str,
        score_id: &str,
    ) -> Result<Class, ApiError> {
        let path = format!(
            "{}/{}",
            Self::performance_path(class_id, sp_id, "activityScores"),
            score_id
        );
        self.delete(&path).await
    }

    pub async fn add_activity_points(
        &self,
        class_id: &str,
        sp_id: &str,
        points: i64,
    ) -> Result<Class, ApiError> {
        // No DELETE variant exists: points are never decremented server-side.
        self.post(
            &Self::performance_path(class_id, sp_id, "activityPoints"),
            &serde_json::json!({ "points": points }),
        )
        .await
    }

    pub async fn add_loudness_warning(
        &self,
        class_id: &str,
        sp_id: &str,
    ) -> Result<Class, ApiError> {
        self.post(
            &Self::performance_path(class_id, sp_id, "loudnessWarnings"),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn delete_loudness_warning(
        &self,
        class_id: &str,
        sp_id: &str,
    ) -> Result<Class, ApiError> {
        self.delete(&Self::performance_path(class_id, sp_id, "loudnessWarnings"))
            .await
    }

    pub async fn add_missing_homework(
        &self,
        class_id: &str,
        sp_id: &str,
        amount: i64,
    ) -> Result<Class, ApiError> {
        self.post(
            &Self::performance_path(class_id, sp_id, "missingHomeworks"),
            &serde_json::json!({ "amount": amount }),
        )
        .await
    }

    pub async fn delete_missing_homework(
        &self,
        class_id: &str,
        sp_id: &str,
    ) -> Result<Class, ApiError> {
        self.delete(&Self::performance_path(class_id, sp_id, "missingHomeworks"))
            .await
    }

    // ===== Authentication =====

    /// Authenticate and return the bearer token. Not routed through the
    /// retry/auth plumbing: login goes out bare.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let url = self.url("/auth/login");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = response.json().await?;
        Ok(login.access_token)
    }
}
