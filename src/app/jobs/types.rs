//! Job tracker type definitions
//!
//! This module contains the data types exposed by the job tracker: job
//! identifiers, the status state machine, pollable job snapshots and the
//! per-submission options.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::client::DownloadOutcome;
use crate::app::hash::HashAlgorithm;
use crate::constants::{download, jobs};

/// Process-unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Allocate the next identifier
    pub(crate) fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the identifier
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a download job
///
/// `Initializing` and `Downloading` are the only non-terminal states; a job
/// in any other state never changes status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a slot or looking up the expected hash
    Initializing,
    /// Response received, bytes are flowing
    Downloading,
    /// Transfer finished; see the result for hash verification
    Completed,
    /// Transfer or catalog update failed
    Error,
    /// Stopped by the caller
    Cancelled,
    /// Stopped by the caller; a new job is needed to continue
    Paused,
}

impl JobStatus {
    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Initializing | JobStatus::Downloading)
    }

    /// Lowercase status name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one tracked download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: JobId,
    /// Listing name the job was submitted for
    pub name: String,
    pub source_url: String,
    pub output_directory: PathBuf,
    pub hash_algorithm: HashAlgorithm,
    /// Digest from the listing or discovery, if any
    pub expected_hash: Option<String>,
    pub status: JobStatus,
    pub bytes_transferred: u64,
    /// 0 when the server sent no `Content-Length`
    pub total_bytes: u64,
    pub start_time: DateTime<Utc>,
    /// Bytes per second since the job started
    pub speed: f64,
    /// Seconds remaining, when the total size is known
    pub eta_seconds: Option<f64>,
    /// Set only in the `error` state
    pub error: Option<String>,
    /// Set only in the `completed` state
    pub result: Option<DownloadOutcome>,
}

impl DownloadJob {
    pub(crate) fn new(
        id: JobId,
        name: String,
        source_url: String,
        output_directory: PathBuf,
        hash_algorithm: HashAlgorithm,
        expected_hash: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            source_url,
            output_directory,
            hash_algorithm,
            expected_hash,
            status: JobStatus::Initializing,
            bytes_transferred: 0,
            total_bytes: 0,
            start_time: Utc::now(),
            speed: 0.0,
            eta_seconds: None,
            error: None,
            result: None,
        }
    }

    /// Completion percentage when the total size is known
    pub fn progress_percentage(&self) -> Option<f64> {
        (self.total_bytes > 0)
            .then(|| (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0)
    }

    /// Seconds since the job was created
    pub fn elapsed_seconds(&self) -> f64 {
        let elapsed = Utc::now() - self.start_time;
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Human-readable status line
    pub fn status_description(&self) -> String {
        match self.status {
            JobStatus::Initializing => format!("Preparing {}", self.name),
            JobStatus::Downloading => match self.progress_percentage() {
                Some(percentage) => format!("Downloading {} ({:.1}%)", self.name, percentage),
                None => format!("Downloading {}", self.name),
            },
            JobStatus::Completed => match &self.result {
                Some(result) if !result.success => {
                    format!("Downloaded {} (hash mismatch)", self.name)
                }
                _ => format!("Downloaded {}", self.name),
            },
            JobStatus::Error => format!(
                "Failed {}: {}",
                self.name,
                self.error.as_deref().unwrap_or("unknown error")
            ),
            JobStatus::Cancelled => format!("Cancelled {}", self.name),
            JobStatus::Paused => format!("Paused {}", self.name),
        }
    }
}

/// Per-submission options
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Directory to download into; the archive directory when unset
    pub output_directory: Option<PathBuf>,
    /// Overrides the listing entry's algorithm
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Overrides the listing entry's digest
    pub expected_hash: Option<String>,
    /// Replace an existing file
    pub force: bool,
    /// Look for a published checksum when no digest is known
    pub discover_hash: Option<bool>,
    /// Template for the first discovery candidate
    pub hash_file_pattern: Option<String>,
    /// Overrides the tracker's transfer timeout
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    pub fn with_output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(directory.into());
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = Some(algorithm);
        self
    }

    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_discovery(mut self, enabled: bool) -> Self {
        self.discover_hash = Some(enabled);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Job tracker runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Jobs transferring at the same time; later jobs queue
    pub max_concurrent_jobs: usize,
    /// Default transfer timeout
    pub timeout: Duration,
    /// Look up checksums for entries without one
    pub discover_hashes: bool,
    /// Directory used when a submission names none
    pub default_output_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: jobs::DEFAULT_MAX_CONCURRENT_JOBS,
            timeout: download::DEFAULT_TIMEOUT,
            discover_hashes: true,
            default_output_dir: PathBuf::from("."),
        }
    }
}
