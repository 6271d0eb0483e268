//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the HTTP client
//! shared by the redirect resolver, the download engine and checksum probes.

use std::time::Duration;

use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};

use crate::constants::{download, http, limits};
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for the shared HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent sent with every request
    pub user_agent: String,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Timeout for HEAD probes, checksum files and listings
    pub probe_timeout: Duration,
    /// Overall time budget for one image transfer
    pub download_timeout: Duration,
    /// Redirect hops followed before failing
    pub max_redirects: usize,
    /// Rate limit for probe and listing requests (requests per second)
    pub rate_limit_rps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: http::USER_AGENT.to_string(),
            tcp_keepalive: Some(Duration::from_secs(30)),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            connect_timeout: http::CONNECT_TIMEOUT,
            probe_timeout: http::PROBE_TIMEOUT,
            download_timeout: download::DEFAULT_TIMEOUT,
            max_redirects: http::MAX_REDIRECTS,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
        }
    }
}

impl ClientConfig {
    /// Set the overall transfer timeout
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Set the redirect hop budget
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Set the probe rate limit
    pub fn with_rate_limit(mut self, rps: u32) -> Self {
        self.rate_limit_rps = rps;
        self
    }

    /// Builds the HTTP client with the specified configuration
    ///
    /// Automatic redirects are disabled: hops are followed explicitly by the
    /// redirect resolver so the hop budget is enforced in one place. No total
    /// request timeout is set on the client because image transfers can run
    /// for many minutes; the engine applies its own overall deadline.
    pub fn build_http_client(&self) -> DownloadResult<Client> {
        let mut client_builder = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        // Configure TCP keep-alive if specified
        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        // Configure connection pool idle timeout
        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(DownloadError::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.download_timeout, Duration::from_secs(600));
        assert_eq!(config.rate_limit_rps, limits::DEFAULT_RATE_LIMIT_RPS);
    }

    #[test]
    fn test_client_config_builders() {
        let config = ClientConfig::default()
            .with_download_timeout(Duration::from_secs(5))
            .with_max_redirects(2)
            .with_rate_limit(50);

        assert_eq!(config.download_timeout, Duration::from_secs(5));
        assert_eq!(config.max_redirects, 2);
        assert_eq!(config.rate_limit_rps, 50);
        assert!(config.tcp_nodelay); // Should inherit default values
    }

    #[test]
    fn test_http_client_creation() {
        let config = ClientConfig::default();
        assert!(config.build_http_client().is_ok());
    }
}
