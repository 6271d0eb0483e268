//! Core HTTP operations with rate limiting and retry logic
//!
//! This module provides the request primitives used by the rest of the engine:
//! lightweight probes for redirect resolution, unbounded streaming GETs for
//! image transfers, and rate-limited text fetches for checksum files and
//! listings.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, Method, Response, StatusCode};
use url::Url;

use crate::app::client::config::ClientConfig;
use crate::constants::{http, limits};
use crate::errors::{DownloadError, DownloadResult};

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
    probe_timeout: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and settings
    pub fn new(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            rate_limiter: Self::build_rate_limiter(config.rate_limit_rps),
            probe_timeout: config.probe_timeout,
        }
    }

    /// Build the client from configuration and wrap it
    pub fn from_config(config: &ClientConfig) -> DownloadResult<Self> {
        let client = config.build_http_client()?;
        Ok(Self::new(client, config))
    }

    /// Builds the rate limiter; a zero rate is clamped to one request per second
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock> {
        let rate = NonZeroU32::new(rate_limit_rps).unwrap_or(NonZeroU32::MIN);
        RateLimiter::direct(Quota::per_second(rate))
    }

    /// Probe a URL for its status and headers
    ///
    /// Sends HEAD first and falls back to GET when the server rejects HEAD.
    /// The GET body is never read.
    pub async fn probe(&self, url: &Url) -> DownloadResult<Response> {
        let response = self.send(Method::HEAD, url, Some(self.probe_timeout)).await?;

        if http::HEAD_REJECTED_STATUSES.contains(&response.status().as_u16()) {
            tracing::debug!(
                "HEAD rejected with {} for {}, retrying with GET",
                response.status(),
                url
            );
            return self.send(Method::GET, url, Some(self.probe_timeout)).await;
        }

        Ok(response)
    }

    /// Start a streaming GET with no per-request deadline
    pub async fn get_stream(&self, url: &Url) -> DownloadResult<Response> {
        self.send(Method::GET, url, None).await
    }

    /// Fetch a small text document with rate limiting and retry logic
    ///
    /// Non-success statuses are returned as [`DownloadError::HttpStatus`].
    /// Bodies larger than `max_bytes` are rejected with a 413 status as soon as
    /// the declared length or the bytes read so far exceed the cap.
    pub async fn get_text(&self, url: &Url, max_bytes: u64) -> DownloadResult<String> {
        // Apply rate limiting with jitter to avoid thundering herd
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let mut retries = 0;
        let mut response = loop {
            let response = self.send(Method::GET, url, Some(self.probe_timeout)).await?;
            let status = response.status();

            if (status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::SERVICE_UNAVAILABLE)
                && retries < limits::MAX_RETRIES
            {
                retries += 1;
                let delay =
                    Duration::from_millis(limits::RETRY_BASE_DELAY_MS * 2_u64.pow(retries));
                tracing::warn!(
                    "Server answered {} for {}. Backing off for {}ms",
                    status,
                    url,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            break response;
        };

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let too_large = || DownloadError::HttpStatus {
            status: StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
            url: url.to_string(),
        };

        if response.content_length().is_some_and(|length| length > max_bytes) {
            return Err(too_large());
        }

        // Content-Length may be absent or wrong, so the cap is enforced while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        timeout: Option<Duration>,
    ) -> DownloadResult<Response> {
        let mut request = self.client.request(method, url.as_str());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout {
                    seconds: timeout.map(|t| t.as_secs()).unwrap_or_default(),
                }
            } else {
                DownloadError::Network(e)
            }
        })
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
