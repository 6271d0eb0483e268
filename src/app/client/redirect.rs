//! Redirect chain resolution
//!
//! Mirrors and CDNs commonly bounce a download URL through several redirects
//! before the bytes are served. The resolver follows `301/302/303/307/308`
//! responses explicitly, up to a hop budget, and returns the terminal URL.
//! A terminal response that is not a redirect is returned as-is whatever its
//! status; callers decide whether it is acceptable.

use std::sync::Arc;

use reqwest::header::LOCATION;
use tracing::debug;
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::constants::http;
use crate::errors::{DownloadError, DownloadResult};

/// Follows redirect chains to a terminal URL
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    http: Arc<HttpHandler>,
    max_hops: usize,
}

impl RedirectResolver {
    /// Create a resolver with the given hop budget
    pub fn new(http: Arc<HttpHandler>, max_hops: usize) -> Self {
        Self { http, max_hops }
    }

    /// Hop budget used by [`resolve`](Self::resolve)
    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Resolve a URL using the configured hop budget
    pub async fn resolve(&self, url: &Url) -> DownloadResult<Url> {
        self.resolve_with_limit(url, self.max_hops).await
    }

    /// Resolve a URL following at most `max_hops` redirects
    ///
    /// # Errors
    ///
    /// - [`DownloadError::TooManyRedirects`] when the chain is longer than `max_hops`
    /// - [`DownloadError::InvalidUrl`] when a `Location` header cannot be resolved
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    pub async fn resolve_with_limit(&self, url: &Url, max_hops: usize) -> DownloadResult<Url> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let response = self.http.probe(&current).await?;
            let status = response.status().as_u16();

            if !http::REDIRECT_STATUSES.contains(&status) {
                return Ok(current);
            }

            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                debug!("Redirect {} from {} without Location header", status, current);
                return Ok(current);
            };

            if hops >= max_hops {
                return Err(DownloadError::TooManyRedirects {
                    url: url.to_string(),
                    max_hops,
                });
            }

            let next = current.join(location).map_err(|e| DownloadError::InvalidUrl {
                url: location.to_string(),
                error: e.to_string(),
            })?;

            hops += 1;
            debug!("Redirect {}/{}: {} -> {}", hops, max_hops, current, next);
            current = next;
        }
    }
}
