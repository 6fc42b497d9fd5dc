//! HTTP client for a live ArchivesSpace backend.
//!
//! Authentication follows the backend's session scheme: `POST /users/{user}/login`
//! returns a session token, which is then sent with every request in the
//! `X-ArchivesSpace-Session` header. Sessions expire, so a request answered with
//! `401`, `403` or `412` triggers one fresh login before it is retried.
//!
//! Connection failures, timeouts and `5xx` responses are retried with exponential
//! backoff, up to `max_retries` times.

use std::time::Duration;

use reqwest::{header::HeaderValue, StatusCode};
use tokio::sync::RwLock;
use url::Url;

use super::*;
use crate::config::ApiSettings;

/// Header carrying the session token.
const SESSION_HEADER: &str = "X-ArchivesSpace-Session";

/// Delay before the first retry; doubled for every further attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Longest delay between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Response body of the login endpoint.
#[derive(Debug, Deserialize)]
struct LoginResponse {
  /// Session token
  session: String,
}

/// Client for the ArchivesSpace backend API.
pub struct ArchivesSpaceClient {
  /// HTTP client used for all requests
  client:      reqwest::Client,
  /// Backend API root
  base_url:    Url,
  /// Login name
  username:    String,
  /// Login password
  password:    String,
  /// Page size for paginated listings
  page_size:   u32,
  /// Retries for transient failures
  max_retries: u32,
  /// Current session token, if logged in
  session:     RwLock<Option<String>>,
}

impl ArchivesSpaceClient {
  /// Creates a client from the `[archivesspace]` settings.
  ///
  /// No request is made until the first fetch, which logs in.
  pub fn new(settings: &ApiSettings) -> Result<Self, Ead2dcError> {
    let client =
      reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_secs)).build()?;
    Ok(Self {
      client,
      base_url: Url::parse(&settings.base_url)?,
      username: settings.username.clone(),
      password: settings.password.clone(),
      page_size: settings.page_size,
      max_retries: settings.max_retries,
      session: RwLock::new(None),
    })
  }

  /// Resolves an API path against the base URL, keeping any path prefix of the base.
  fn url(&self, path: &str) -> Result<Url, Ead2dcError> {
    let base = self.base_url.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
  }

  /// Logs in and returns a fresh session token.
  async fn login(&self) -> Result<String, Ead2dcError> {
    debug!("Logging in to ArchivesSpace as {}", self.username);
    let url = self.url(&format!("/users/{}/login", self.username))?;
    let response =
      self.client.post(url).query(&[("password", self.password.as_str())]).send().await?;

    match response.status() {
      StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => Err(Ead2dcError::Unauthorized),
      status if !status.is_success() =>
        Err(Ead2dcError::ApiError(format!("login failed with status {status}"))),
      _ => Ok(response.json::<LoginResponse>().await?.session),
    }
  }

  /// Returns the current session token, logging in first if there is none.
  async fn session(&self) -> Result<String, Ead2dcError> {
    if let Some(token) = self.session.read().await.as_ref() {
      return Ok(token.clone());
    }
    let mut session = self.session.write().await;
    if let Some(token) = session.as_ref() {
      return Ok(token.clone());
    }
    let token = self.login().await?;
    *session = Some(token.clone());
    Ok(token)
  }

  /// Performs one authenticated GET, re-authenticating once on an expired session and
  /// retrying transient failures.
  async fn get_json(&self, path: &str) -> Result<Value, Ead2dcError> {
    let url = self.url(path)?;
    let mut attempt = 0;
    let mut reauthenticated = false;

    loop {
      let token = self.session().await?;
      let header = HeaderValue::from_str(&token)
        .map_err(|_| Ead2dcError::ApiError("session token is not a valid header".into()))?;
      debug!("GET {url}");

      let error = match self.client.get(url.clone()).header(SESSION_HEADER, header).send().await {
        Ok(response) => match response.status() {
          StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PRECONDITION_FAILED
            if !reauthenticated =>
          {
            debug!("Session rejected for {path}, logging in again");
            reauthenticated = true;
            *self.session.write().await = None;
            continue;
          },
          StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PRECONDITION_FAILED =>
            return Err(Ead2dcError::Unauthorized),
          StatusCode::NOT_FOUND => return Err(Ead2dcError::NotFound(path.to_string())),
          _ => match response.error_for_status() {
            Ok(response) => return Ok(response.json().await?),
            Err(e) => Ead2dcError::from(e),
          },
        },
        Err(e) => Ead2dcError::from(e),
      };

      if !error.is_retryable() || attempt >= self.max_retries {
        return Err(error);
      }
      let delay = backoff(attempt);
      warn!("Request for {path} failed ({error}), retrying in {delay:?}");
      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  }
}

/// Delay before retry number `attempt + 1`.
fn backoff(attempt: u32) -> Duration {
  INITIAL_BACKOFF.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Appends the paging parameters to a listing path.
fn paged_path(path: &str, page: u32, page_size: u32) -> String {
  let separator = if path.contains('?') { '&' } else { '?' };
  format!("{path}{separator}page={page}&page_size={page_size}")
}

#[async_trait]
impl ArchivesSpace for ArchivesSpaceClient {
  async fn get(&self, path: &str) -> Result<Value, Ead2dcError> { self.get_json(path).await }

  async fn get_page(&self, path: &str, page: u32) -> Result<Page, Ead2dcError> {
    let json = self.get_json(&paged_path(path, page, self.page_size)).await?;
    Ok(serde_json::from_value(json)?)
  }
}
