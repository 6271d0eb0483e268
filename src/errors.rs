//! Error types for ISO Fetcher
//!
//! This module defines the error taxonomy for every component of the download
//! and archive engine. Errors are designed to be actionable and to carry enough
//! context (paths, URLs, status codes) for logs and user-facing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Download, redirect and HTTP transfer errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Connection, TLS or body read failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The transfer exceeded its overall time budget
    #[error("Download timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Terminal response was not a success status
    #[error("Server returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Redirect chain longer than the hop budget
    #[error("Too many redirects (limit {max_hops}) while resolving {url}")]
    TooManyRedirects { url: String, max_hops: usize },

    /// The final URL has no usable last path segment
    #[error("Could not determine a filename from URL: {url}")]
    UndeterminedFilename { url: String },

    /// Destination file is present and overwriting was not allowed
    #[error("File already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Write, permission or disk space failure
    #[error("File system error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Computed hash differs from the expected one
    #[error("File hash mismatch. Expected: {expected}, got: {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Transfer stopped on request (cancel or pause)
    #[error("Download was stopped before completion")]
    Cancelled,
}

impl DownloadError {
    /// Wrap an I/O error with the path it happened on
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }
}

/// Malformed listing, checksum or algorithm input
#[derive(Error, Debug)]
pub enum ParseError {
    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Listing document has an unexpected shape
    #[error("Invalid listing: {reason}")]
    InvalidListing { reason: String },

    /// Hash algorithm name not recognised
    #[error("Unknown hash algorithm: {name}. Expected one of md5, sha1, sha256, sha512")]
    UnknownAlgorithm { name: String },
}

/// Archive catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No record and no file for this filename
    #[error("Archive entry not found: {filename}")]
    NotFound { filename: String },

    /// Requested filename escapes the archive directory
    #[error("Refusing to touch path outside the archive directory: {filename}")]
    PathTraversal { filename: String },

    /// Catalog or archive file I/O failure
    #[error("Archive I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog document could not be serialized
    #[error("Failed to serialize archive catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CatalogError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Job tracker errors
#[derive(Error, Debug)]
pub enum JobError {
    /// Unknown job id
    #[error("Download job not found: {id}")]
    NotFound { id: u64 },

    /// Job already reached a terminal state
    #[error("Download job {id} already finished with status {status}")]
    AlreadyFinished { id: u64, status: String },

    /// Job cannot be evicted while it is still running
    #[error("Download job {id} is still running")]
    StillRunning { id: u64 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// I/O error reading the configuration file
    #[error("Configuration I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(DownloadError::Timeout { .. })
            | AppError::Download(DownloadError::Network(_)) => true,
            AppError::Download(DownloadError::HttpStatus { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Parse(_) => "parse",
            AppError::Catalog(_) => "catalog",
            AppError::Job(_) => "job",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Parse result type alias
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Job result type alias
pub type JobResult<T> = std::result::Result<T, JobError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
