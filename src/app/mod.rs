//! Core application logic for ISO Fetcher
//!
//! This module contains the download engine and everything built around it:
//!
//! - `hash`: digest algorithms, incremental hashing and file verification
//! - `client`: HTTP plumbing, redirect resolution and streaming downloads
//! - `discovery`: locating published checksums next to an image
//! - `models`: published listings of downloadable images
//! - `archive`: the on-disk catalog of archived images and update detection
//! - `jobs`: background download jobs observed by polling
//! - `service`: the facade outer layers build on
//!
//! # Examples
//!
//! ```rust,no_run
//! use iso_fetcher::app::{HashAlgorithm, ListingEntry, SubmitOptions};
//! use iso_fetcher::app::service::{ArchiveService, ServiceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ArchiveService::new(ServiceConfig::new("/srv/isos"))?;
//!
//! let entry = ListingEntry::from_url(
//!     "https://cdimage.debian.org/debian-cd/current/amd64/iso-cd/debian-12.5.0-amd64-netinst.iso",
//!     HashAlgorithm::Sha256,
//! );
//! let id = service.submit_entry(entry, SubmitOptions::default()).await;
//! let job = service.job_status(id).await?;
//! println!("{}", job.status_description());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod client;
pub mod discovery;
pub mod hash;
pub mod jobs;
pub mod models;
pub mod service;

// Re-export main public API
pub use archive::{ArchiveCatalog, ArchiveConfig, ArchiveRecord, ListingStatus};
pub use client::{
    ClientConfig, DownloadEngine, DownloadOptions, DownloadOutcome, DownloadProgress, HttpHandler,
    RedirectResolver,
};
pub use discovery::{DiscoveredHash, HashDiscovery};
pub use hash::{HashAlgorithm, HashComputer, HashVerifier, VerificationOutcome};
pub use jobs::{DownloadJob, JobId, JobStatus, JobTracker, SubmitOptions, TrackerConfig};
pub use models::{parse_listing, ListingEntry};
pub use service::{ArchiveService, ServiceConfig};
