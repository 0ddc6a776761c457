//! HTTP transport with exponential backoff retry logic.
//!
//! Everything that touches the network goes through the [`Fetcher`] trait so
//! the extraction and selection stages can be exercised against canned
//! responses.
//!
//! # Architecture
//!
//! - [`Fetcher`]: core trait with `get`, `head` and partial `get_prefix`
//! - [`HttpFetcher`]: `reqwest` implementation with bounded timeouts
//! - [`RetryFetcher`]: decorator that retries transient failures
//!
//! # Retry Strategy
//!
//! - Maximum 3 retry attempts
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd
//! - Only 429/500/502/503/504, timeouts and connection errors are retried

use crate::config::HttpSettings;
use async_trait::async_trait;
use rand::{Rng, rng};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Response};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// HTTP statuses worth retrying.
const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Request(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status(code) => TRANSIENT_STATUSES.contains(code),
            FetchError::Timeout | FetchError::Connect(_) => true,
            FetchError::InvalidUrl(_) | FetchError::Request(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

/// The headers the pipeline cares about, and (possibly partial) body of a
/// successful response.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// Where the request ended up after redirects.
    pub final_url: Option<Url>,
    /// Value of the `Content-Length` header, when present and numeric.
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Base for resolving relative links found in the body: the final URL,
    /// or `requested` when the fetcher did not report one.
    pub fn base_url(&self, requested: &Url) -> Url {
        self.final_url.clone().unwrap_or_else(|| requested.clone())
    }

    /// Whether the declared media type is textual (an HTML error page
    /// served in place of an image, for instance).
    pub fn is_text(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/"))
    }
}

/// Blocking-style HTTP access as seen by the pipeline.
///
/// Non-success statuses are reported as [`FetchError::Status`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the full body of `url`.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// Fetch only the headers of `url`.
    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// Fetch at most `limit` bytes of the body of `url`.
    async fn get_prefix(&self, url: &str, limit: usize) -> Result<FetchResponse, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    request_timeout: Duration,
    validation_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            request_timeout: settings.request_timeout(),
            validation_timeout: settings.validation_timeout(),
        })
    }

    fn check_status(resp: &Response) -> Result<(), FetchError> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(FetchError::Status(status.as_u16()))
        }
    }
}

fn header_fields(headers: &HeaderMap) -> (Option<u64>, Option<String>) {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    (content_length, content_type)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Self::check_status(&resp)?;
        let final_url = Some(resp.url().clone());
        let (content_length, content_type) = header_fields(resp.headers());
        let body = resp.bytes().await?.to_vec();
        debug!(bytes = body.len(), final_url = ?final_url.as_ref().map(Url::as_str), "Fetched body");
        Ok(FetchResponse {
            final_url,
            content_length,
            content_type,
            body,
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let resp = self
            .client
            .head(url)
            .timeout(self.validation_timeout)
            .send()
            .await?;
        Self::check_status(&resp)?;
        let (content_length, content_type) = header_fields(resp.headers());
        Ok(FetchResponse {
            final_url: Some(resp.url().clone()),
            content_length,
            content_type,
            body: Vec::new(),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_prefix(&self, url: &str, limit: usize) -> Result<FetchResponse, FetchError> {
        let mut resp = self
            .client
            .get(url)
            .timeout(self.validation_timeout)
            .send()
            .await?;
        Self::check_status(&resp)?;
        let final_url = Some(resp.url().clone());
        let (content_length, content_type) = header_fields(resp.headers());

        let mut body = Vec::with_capacity(limit.min(64 * 1024));
        while let Some(chunk) = resp.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() >= limit {
                body.truncate(limit);
                break;
            }
        }
        Ok(FetchResponse {
            final_url,
            content_length,
            content_type,
            body,
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetcher`].
///
/// # Backoff Strategy
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..jitter)
/// ```
pub struct RetryFetcher<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl<T> RetryFetcher<T>
where
    T: Fetcher,
{
    pub fn new(inner: T, settings: &HttpSettings) -> Self {
        Self {
            inner,
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.backoff_base_ms),
            max_delay: Duration::from_millis(settings.backoff_max_ms),
            jitter: Duration::from_millis(settings.jitter_ms),
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let mut delay = self.base_delay.saturating_mul(1 << shift);
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms > 0 {
            delay += Duration::from_millis(rng().random_range(0..=jitter_ms));
        }
        delay
    }

    async fn with_retries<'a, F, Fut>(&'a self, op: &'static str, url: &str, call: F) -> Result<FetchResponse, FetchError>
    where
        F: Fn(&'a T) -> Fut,
        Fut: std::future::Future<Output = Result<FetchResponse, FetchError>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match call(&self.inner).await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            op,
                            %url,
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        op,
                        %url,
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl<T> fmt::Debug for RetryFetcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetcher")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> Fetcher for RetryFetcher<T>
where
    T: Fetcher,
{
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.with_retries("get", url, |inner| inner.get(url)).await
    }

    async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.with_retries("head", url, |inner| inner.head(url)).await
    }

    async fn get_prefix(&self, url: &str, limit: usize) -> Result<FetchResponse, FetchError> {
        self.with_retries("get_prefix", url, |inner| inner.get_prefix(url, limit))
            .await
    }
}

/// In-memory fetcher for tests.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum Canned {
        Ok(FetchResponse),
        Status(u16),
        Redirect(String),
    }

    /// Serves canned bodies by exact URL; anything else is a 404.
    #[derive(Debug, Default)]
    pub struct StaticFetcher {
        routes: HashMap<String, Canned>,
        head_refused: HashMap<String, u16>,
        hits: Mutex<HashMap<String, usize>>,
    }

    impl StaticFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        fn ok(mut self, url: &str, content_length: u64, content_type: &str, body: Vec<u8>) -> Self {
            self.routes.insert(
                url.to_string(),
                Canned::Ok(FetchResponse {
                    final_url: None,
                    content_length: Some(content_length),
                    content_type: Some(content_type.to_string()),
                    body,
                }),
            );
            self
        }

        pub fn html(self, url: &str, html: &str) -> Self {
            self.ok(url, html.len() as u64, "text/html; charset=utf-8", html.as_bytes().to_vec())
        }

        pub fn bytes(self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
            let len = body.len() as u64;
            self.ok(url, len, content_type, body)
        }

        /// Serve `body` but advertise `content_length` in the headers.
        pub fn bytes_with_length(self, url: &str, body: Vec<u8>, content_length: u64) -> Self {
            self.ok(url, content_length, "image/jpeg", body)
        }

        pub fn status(mut self, url: &str, status: u16) -> Self {
            self.routes.insert(url.to_string(), Canned::Status(status));
            self
        }

        /// Requests for `from` end up at `to`, which must have its own route.
        pub fn redirect(mut self, from: &str, to: &str) -> Self {
            self.routes.insert(from.to_string(), Canned::Redirect(to.to_string()));
            self
        }

        /// HEAD requests for `url` fail with `status`; GETs are unaffected.
        pub fn refuse_head(mut self, url: &str, status: u16) -> Self {
            self.head_refused.insert(url.to_string(), status);
            self
        }

        /// Number of requests of any kind made for `url`.
        pub fn hits(&self, url: &str) -> usize {
            self.hits
                .lock()
                .map(|h| h.get(url).copied().unwrap_or(0))
                .unwrap_or(0)
        }

        fn count(&self, url: &str) {
            if let Ok(mut hits) = self.hits.lock() {
                *hits.entry(url.to_string()).or_insert(0) += 1;
            }
        }

        fn serve(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.count(url);
            let mut current = url.to_string();
            for _ in 0..10 {
                match self.routes.get(&current) {
                    Some(Canned::Ok(resp)) => {
                        let mut resp = resp.clone();
                        resp.final_url = Url::parse(&current).ok();
                        return Ok(resp);
                    }
                    Some(Canned::Status(code)) => return Err(FetchError::Status(*code)),
                    Some(Canned::Redirect(to)) => current = to.clone(),
                    None => return Err(FetchError::Status(404)),
                }
            }
            Err(FetchError::Request(format!("too many redirects for {url}")))
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
            self.serve(url)
        }

        async fn head(&self, url: &str) -> Result<FetchResponse, FetchError> {
            if let Some(&code) = self.head_refused.get(url) {
                self.count(url);
                return Err(FetchError::Status(code));
            }
            let mut resp = self.serve(url)?;
            resp.body.clear();
            Ok(resp)
        }

        async fn get_prefix(&self, url: &str, limit: usize) -> Result<FetchResponse, FetchError> {
            let mut resp = self.serve(url)?;
            resp.body.truncate(limit);
            Ok(resp)
        }
    }
}
