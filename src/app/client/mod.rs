//! HTTP client implementation for image downloads
//!
//! This module provides the network side of the engine. It is organized into
//! specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with rate limiting and retries
//! - `redirect`: Explicit redirect following with a hop budget
//! - `download`: Streaming downloads with inline hashing and atomic placement

use std::sync::Arc;

use crate::errors::DownloadResult;

pub mod config;
pub mod download;
pub mod http;
pub mod redirect;

pub use config::ClientConfig;
pub use download::{DownloadEngine, DownloadOptions, DownloadOutcome, DownloadProgress};
pub use http::HttpHandler;
pub use redirect::RedirectResolver;

/// Build the shared HTTP handler, resolver and engine from one configuration
pub fn build_engine(
    config: &ClientConfig,
) -> DownloadResult<(Arc<HttpHandler>, RedirectResolver, DownloadEngine)> {
    let http = Arc::new(HttpHandler::from_config(config)?);
    let resolver = RedirectResolver::new(http.clone(), config.max_redirects);
    let engine = DownloadEngine::new(http.clone(), resolver.clone(), config.download_timeout);

    tracing::debug!(
        "Built download engine (max redirects {}, timeout {:?})",
        config.max_redirects,
        config.download_timeout
    );

    Ok((http, resolver, engine))
}
