//! Prelude module for ISO Fetcher Library
//!
//! Re-exports the items needed for typical usage with a single
//! `use iso_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use iso_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let service = ArchiveService::new(ServiceConfig::new("/srv/isos"))?;
//!     let id = service
//!         .submit_download("https://example.org/debian.iso", SubmitOptions::default())
//!         .await;
//!     let job = service.tracker().poll_until_finished(id, POLL_INTERVAL).await?;
//!     println!("{}", job.status_description());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Service facade and its configuration
pub use crate::app::service::{ArchiveService, ServiceConfig};
pub use crate::config::AppConfig;

// Components
pub use crate::app::{
    ArchiveCatalog, ArchiveConfig, ArchiveRecord, ClientConfig, DiscoveredHash, DownloadEngine,
    DownloadJob, DownloadOptions, DownloadOutcome, HashAlgorithm, HashComputer, HashDiscovery,
    HashVerifier, JobId, JobStatus, JobTracker, ListingEntry, ListingStatus, SubmitOptions,
    TrackerConfig,
};

// Commonly used constants
pub use crate::constants::jobs::POLL_INTERVAL;
pub use crate::constants::{DEFAULT_MAX_CONCURRENT_JOBS, MAX_REDIRECTS, USER_AGENT};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _client_config = ClientConfig::default();
        let _tracker_config = TrackerConfig::default();
        let _options = SubmitOptions::default();

        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
        assert!(USER_AGENT.contains("ISO-Fetcher"));
    }

    #[tokio::test]
    async fn test_prelude_integration_pattern() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let service = ArchiveService::new(ServiceConfig::new(temp_dir.path())).unwrap();

        assert!(service.list_archive().await.is_empty());
        assert_eq!(
            service.tracker().config().max_concurrent_jobs,
            DEFAULT_MAX_CONCURRENT_JOBS
        );
    }
}
