//! services/dashboard/src/http/client.rs
//!
//! The request pipeline every remote call goes through: rate limiting, bearer
//! and CSRF headers, per-request timeout, cancellation, retry with backoff,
//! GET caching, and one refresh-and-replay on 401.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, COOKIE, RETRY_AFTER, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ResponseCache;
use super::error::HttpError;
use super::rate_limit::RateLimiter;
use super::retry::{parse_retry_after, RetryPolicy};
use crate::config::Config;
use crate::session::store::SessionStore;

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REGISTER_PATH: &str = "/auth/register/";
pub const REFRESH_PATH: &str = "/auth/refresh/";
pub const CSRF_HEADER: &str = "X-CSRFToken";

//=========================================================================================
// Request description
//=========================================================================================

/// One logical call against the remote API. Retries and the 401 replay
/// re-send the same description.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Result<serde_json::Value, String>>,
    cancel: Option<CancellationToken>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_value(body).map_err(|e| e.to_string()));
        self
    }

    /// Abort the request (and any pending retry) when `token` is cancelled.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn cache_key(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }

    fn is_credential_exchange(&self) -> bool {
        self.path.starts_with(LOGIN_PATH) || self.path.starts_with(REGISTER_PATH)
    }

    fn is_refresh(&self) -> bool {
        self.path.starts_with(REFRESH_PATH)
    }

    fn is_mutation(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// A failed attempt plus whatever the server said about retrying it.
struct Failure {
    error: HttpError,
    retry_after: Option<Duration>,
}

impl From<HttpError> for Failure {
    fn from(error: HttpError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
}

//=========================================================================================
// HttpClient
//=========================================================================================

pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
    timeout: Duration,
    /// Session generation the cached entries belong to.
    cached_generation: AtomicU64,
}

impl HttpClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionStore>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let cached_generation = AtomicU64::new(session.generation());
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            limiter,
            cache,
            retry,
            timeout,
            cached_generation,
        }
    }

    /// Builds the client and its collaborators from the service config.
    pub fn from_config(config: &Config, session: Arc<SessionStore>) -> Self {
        Self::new(
            config.api_base_url.clone(),
            session,
            Arc::new(RateLimiter::new(
                config.rate_limit_max,
                config.rate_limit_window,
            )),
            Arc::new(ResponseCache::new(config.cache_ttl)),
            RetryPolicy::new(config.max_retries),
            config.request_timeout,
        )
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Sends `request` and decodes a JSON response body.
    pub async fn json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, HttpError> {
        let body = self.send(request).await?;
        serde_json::from_slice(&body).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Sends `request` and returns the raw body of a 2xx response.
    pub async fn send(&self, request: ApiRequest) -> Result<Bytes, HttpError> {
        let cancel = request.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(HttpError::Cancelled);
        }

        let generation = self.session.generation();
        if self.cached_generation.swap(generation, Ordering::SeqCst) != generation {
            debug!("Session changed, dropping cached responses");
            self.cache.clear();
        }

        let cacheable = request.method == Method::GET;
        let cache_key = format!("{}:{}", generation, request.cache_key());
        if cacheable {
            if let Some(body) = self.cache.get(&cache_key).await {
                debug!(path = %cache_key, "Serving GET from cache");
                return Ok(body);
            }
        }

        let mut attempt = 0u32;
        let mut refreshed = false;
        loop {
            match self.execute(&request, &cancel).await {
                Ok(body) => {
                    // A login, logout or expiry during the call makes the body stale.
                    if cacheable && self.session.generation() == generation {
                        self.cache.put(cache_key, body.clone()).await;
                    } else if request.is_mutation() {
                        self.cache.clear();
                    }
                    return Ok(body);
                }
                Err(Failure {
                    error: HttpError::Status { status: 401, .. },
                    ..
                }) if !refreshed && !request.is_refresh() && !request.is_credential_exchange() => {
                    refreshed = true;
                    info!(path = %request.path, "Access token rejected, refreshing once");
                    if let Err(e) = self.refresh_access_token(&cancel).await {
                        if e.is_silent() {
                            return Err(e);
                        }
                        warn!("Token refresh failed, ending the session: {}", e);
                        self.session.expire();
                        self.cache.clear();
                        return Err(HttpError::SessionExpired);
                    }
                }
                Err(failure) => {
                    if !self
                        .retry
                        .should_retry(&request.method, &failure.error, attempt)
                    {
                        return Err(failure.error);
                    }
                    let delay = self.retry.delay(attempt, failure.retry_after);
                    attempt += 1;
                    warn!(
                        path = %request.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after: {}",
                        failure.error
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Exchanges the stored refresh token for a new access token. Makes a
    /// single attempt and never triggers another refresh.
    pub async fn refresh_access_token(&self, cancel: &CancellationToken) -> Result<String, HttpError> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(HttpError::SessionExpired)?;
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({ "refresh": refresh_token }));
        let body = self.execute(&request, cancel).await.map_err(|f| f.error)?;
        let refreshed: RefreshResponse =
            serde_json::from_slice(&body).map_err(|e| HttpError::Decode(e.to_string()))?;
        self.session
            .set_access_token(&refreshed.access)
            .map_err(|e| HttpError::Decode(e.to_string()))?;
        Ok(refreshed.access)
    }

    /// One attempt: waits for a rate-limit slot, then sends under the timeout.
    async fn execute(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Bytes, Failure> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(HttpError::Cancelled.into()),
            _ = self.limiter.acquire() => {}
        }

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.is_credential_exchange() {
            if let Some(token) = self.session.access_token() {
                builder = builder.bearer_auth(token);
            }
        }
        if request.is_mutation() {
            if let Some(csrf) = self.session.cookies().csrf_token() {
                builder = builder.header(CSRF_HEADER, csrf);
            }
        }
        if let Some(cookie) = self.session.cookies().header_value() {
            builder = builder.header(COOKIE, cookie);
        }
        match &request.body {
            Some(Ok(body)) => builder = builder.json(body),
            Some(Err(e)) => {
                return Err(HttpError::Decode(format!("request body: {}", e)).into());
            }
            None => {}
        }

        let exchange = async {
            let timeout = self.timeout;
            let response = builder.send().await.map_err(|e| classify(e, timeout))?;
            for value in response.headers().get_all(SET_COOKIE) {
                if let Ok(value) = value.to_str() {
                    self.session.cookies().absorb(value);
                }
            }
            let status = response.status();
            let retry_after = parse_retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
            if status.is_success() {
                Ok::<Bytes, Failure>(body)
            } else {
                Err(Failure {
                    error: HttpError::Status {
                        status: status.as_u16(),
                        message: error_message(status, &body),
                    },
                    retry_after,
                })
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(HttpError::Cancelled.into()),
            outcome = tokio::time::timeout(self.timeout, exchange) => match outcome {
                Ok(result) => result,
                Err(_) => Err(HttpError::Timeout(self.timeout.as_secs()).into()),
            },
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> Failure {
    if err.is_timeout() {
        HttpError::Timeout(timeout.as_secs()).into()
    } else {
        HttpError::Network(err.to_string()).into()
    }
}

/// Best human-readable message in an error body: `detail`, `message` or
/// `error`, else the raw text, else the reason phrase.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = json.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if !text.is_empty() && text.len() <= 200 {
        return text;
    }
    status.canonical_reason().unwrap_or("Unknown error").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_includes_query() {
        let request = ApiRequest::get("/patients/")
            .query("page", 2)
            .query("page_size", 20);
        assert_eq!(request.cache_key(), "/patients/?page=2&page_size=20");
    }

    #[test]
    fn credential_endpoints_skip_bearer() {
        assert!(ApiRequest::post(LOGIN_PATH).is_credential_exchange());
        assert!(ApiRequest::post(REGISTER_PATH).is_credential_exchange());
        assert!(!ApiRequest::post(REFRESH_PATH).is_credential_exchange());
        assert!(!ApiRequest::get("/patients/").is_credential_exchange());
    }

    #[tokio::test]
    async fn transport_timeouts_report_the_configured_deadline() {
        // Accepts the connection but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let err = reqwest::Client::builder()
            .timeout(Duration::from_millis(20))
            .build()
            .unwrap()
            .get(url)
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let failure = classify(err, Duration::from_secs(15));
        assert_eq!(failure.error, HttpError::Timeout(15));
    }

    #[test]
    fn error_message_prefers_detail() {
        let status = StatusCode::BAD_REQUEST;
        assert_eq!(error_message(status, br#"{"detail": "DNI duplicado"}"#), "DNI duplicado");
        assert_eq!(error_message(status, b"plain failure"), "plain failure");
        assert_eq!(error_message(status, b""), "Bad Request");
    }
}
