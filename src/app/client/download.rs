//! Streaming image downloads with inline hashing
//!
//! The engine resolves redirects, streams the response body into a temporary
//! file next to the destination while feeding every chunk to a hashing thread,
//! and moves the temporary file into place once the body is complete. Every
//! transfer gets its own temporary file, so concurrent transfers of the same
//! image never touch each other's bytes. Any failure, timeout or stop request
//! removes the temporary file, so a transfer leaves either a complete file or
//! nothing at all.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::app::client::redirect::RedirectResolver;
use crate::app::hash::{HashAlgorithm, HashComputer};
use crate::app::models::filename_from_url;
use crate::constants::{download, files};
use crate::errors::{DownloadError, DownloadResult};

/// Progress snapshot pushed after every written chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Bytes written so far
    pub bytes_transferred: u64,
    /// Size from `Content-Length`, 0 when unknown
    pub total_bytes: u64,
    /// 0-100, stays 0 until completion when the size is unknown
    pub percentage: f64,
}

impl DownloadProgress {
    fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes > 0 {
            (bytes_transferred as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        };
        Self {
            bytes_transferred,
            total_bytes,
            percentage,
        }
    }

    fn finished(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred,
            total_bytes: total_bytes.max(bytes_transferred),
            percentage: 100.0,
        }
    }
}

/// Per-transfer options
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Digest to compute while streaming
    pub hash_algorithm: HashAlgorithm,
    /// Digest to compare against once the body is complete
    pub expected_hash: Option<String>,
    /// Replace an existing destination file
    pub force: bool,
    /// Overrides the engine's overall timeout
    pub timeout: Option<Duration>,
    /// Receives progress snapshots; a full channel drops snapshots rather
    /// than stalling the transfer
    pub progress: Option<mpsc::Sender<DownloadProgress>>,
    /// Stops the transfer when the value becomes `true`
    pub stop: Option<watch::Receiver<bool>>,
}

impl DownloadOptions {
    /// Options for the given algorithm with no expected hash
    pub fn new(hash_algorithm: HashAlgorithm) -> Self {
        Self {
            hash_algorithm,
            ..Default::default()
        }
    }

    /// Compare the computed digest against `hash`
    pub fn with_expected_hash(mut self, hash: Option<String>) -> Self {
        self.expected_hash = hash;
        self
    }

    /// Allow overwriting an existing file
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Override the overall timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Report progress on `sender`
    pub fn with_progress(mut self, sender: mpsc::Sender<DownloadProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Watch `stop` for a stop request
    pub fn with_stop(mut self, stop: watch::Receiver<bool>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Result of a completed transfer
///
/// A hash mismatch is reported here with `success == false` rather than as an
/// error; the file is kept so the caller can decide what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    /// False only when an expected hash was supplied and did not match
    pub success: bool,
    /// Final location of the file
    pub path: PathBuf,
    /// On-disk basename
    pub filename: String,
    /// Digest computed from the written bytes
    pub hash: String,
    /// Digest the caller expected, lowercased
    pub expected_hash: Option<String>,
    /// Algorithm of both digests
    pub hash_algorithm: HashAlgorithm,
    /// Bytes written
    pub size: u64,
    /// Wall-clock time of the whole transfer
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl DownloadOutcome {
    /// Whether an expected hash was supplied and matched
    pub fn is_verified(&self) -> bool {
        self.success && self.expected_hash.is_some()
    }

    /// Turn a mismatch into [`DownloadError::HashMismatch`]
    pub fn ensure_verified(self) -> DownloadResult<Self> {
        match &self.expected_hash {
            Some(expected) if !self.success => Err(DownloadError::HashMismatch {
                expected: expected.clone(),
                actual: self.hash.clone(),
            }),
            _ => Ok(self),
        }
    }
}

struct Transferred {
    path: PathBuf,
    filename: String,
    hash: String,
    size: u64,
}

/// Streams remote files to disk while hashing them
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    http: Arc<HttpHandler>,
    resolver: RedirectResolver,
    timeout: Duration,
}

impl DownloadEngine {
    /// Create an engine sharing the given HTTP handler
    pub fn new(http: Arc<HttpHandler>, resolver: RedirectResolver, timeout: Duration) -> Self {
        Self {
            http,
            resolver,
            timeout,
        }
    }

    /// The redirect resolver used before each transfer
    pub fn resolver(&self) -> &RedirectResolver {
        &self.resolver
    }

    /// Download `url` into `output_dir`
    ///
    /// The file is named after the last path segment of the URL reached after
    /// following redirects.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - the URL is invalid or the redirect chain is too long
    /// - no filename can be derived from the final URL
    /// - the destination exists and `force` is false
    /// - the server answers with a non-success status
    /// - the transfer fails, times out or is stopped
    /// - the file cannot be written
    pub async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        mut options: DownloadOptions,
    ) -> DownloadResult<DownloadOutcome> {
        let url = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        let mut stop = options.stop.take();
        let timeout = options.timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let mut partial: Option<PathBuf> = None;

        let result = tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop) => Err(DownloadError::Cancelled),
            transfer = tokio::time::timeout(
                timeout,
                self.transfer(&url, output_dir, &options, &mut partial),
            ) => match transfer {
                Ok(result) => result,
                Err(_) => Err(DownloadError::Timeout {
                    seconds: timeout.as_secs(),
                }),
            },
        };

        let transferred = match result {
            Ok(transferred) => transferred,
            Err(e) => {
                if let Some(temp_path) = partial {
                    remove_partial(&temp_path).await;
                }
                warn!("Download of {} failed: {}", url, e);
                return Err(e);
            }
        };

        let expected_hash = options
            .expected_hash
            .as_deref()
            .map(|hash| hash.trim().to_ascii_lowercase());
        let success = expected_hash
            .as_deref()
            .map_or(true, |expected| expected == transferred.hash);

        if success {
            info!(
                "Downloaded {} ({} bytes, {} {})",
                transferred.path.display(),
                transferred.size,
                options.hash_algorithm,
                transferred.hash
            );
        } else {
            warn!(
                "Hash mismatch for {}: expected {}, got {}",
                transferred.path.display(),
                expected_hash.as_deref().unwrap_or_default(),
                transferred.hash
            );
        }

        Ok(DownloadOutcome {
            success,
            path: transferred.path,
            filename: transferred.filename,
            hash: transferred.hash,
            expected_hash,
            hash_algorithm: options.hash_algorithm,
            size: transferred.size,
            duration: started.elapsed(),
        })
    }

    async fn transfer(
        &self,
        url: &Url,
        output_dir: &Path,
        options: &DownloadOptions,
        partial: &mut Option<PathBuf>,
    ) -> DownloadResult<Transferred> {
        let final_url = self.resolver.resolve(url).await?;
        let filename =
            filename_from_url(&final_url).ok_or_else(|| DownloadError::UndeterminedFilename {
                url: final_url.to_string(),
            })?;

        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DownloadError::file_system(output_dir, e))?;

        let destination = output_dir.join(&filename);
        if !options.force && fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(DownloadError::DestinationExists { path: destination });
        }

        let response = self.http.get_stream(&final_url).await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status().as_u16(),
                url: final_url.to_string(),
            });
        }

        let temp_path = transfer_temp_path(&destination);
        *partial = Some(temp_path.clone());

        let (hash, size) = Self::stream_to_file(response, &temp_path, options).await?;

        place_file(&temp_path, &destination, options.force).await?;
        *partial = None;

        Ok(Transferred {
            path: destination,
            filename,
            hash,
            size,
        })
    }

    /// Write the body to `temp_path`, hashing it on the blocking pool
    async fn stream_to_file(
        mut response: reqwest::Response,
        temp_path: &Path,
        options: &DownloadOptions,
    ) -> DownloadResult<(String, u64)> {
        let total_bytes = response.content_length().unwrap_or(0);
        report(options, DownloadProgress::new(0, total_bytes));

        let mut file = File::create(temp_path)
            .await
            .map_err(|e| DownloadError::file_system(temp_path, e))?;

        let algorithm = options.hash_algorithm;
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<Bytes>(download::HASH_CHANNEL_CAPACITY);
        let hasher = tokio::task::spawn_blocking(move || {
            let mut computer = HashComputer::new(algorithm);
            while let Some(chunk) = chunk_rx.blocking_recv() {
                computer.update(&chunk);
            }
            computer.finalize_hex()
        });

        let mut transferred: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::file_system(temp_path, e))?;
            transferred += chunk.len() as u64;

            if chunk_tx.send(chunk).await.is_err() {
                return Err(DownloadError::file_system(
                    temp_path,
                    std::io::Error::new(std::io::ErrorKind::Other, "hashing task stopped"),
                ));
            }

            report(options, DownloadProgress::new(transferred, total_bytes));
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::file_system(temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| DownloadError::file_system(temp_path, e))?;
        drop(file);
        drop(chunk_tx);

        let hash = hasher.await.map_err(|e| {
            DownloadError::file_system(
                temp_path,
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;

        report(options, DownloadProgress::finished(transferred, total_bytes));
        debug!("Streamed {} bytes into {}", transferred, temp_path.display());
        Ok((hash, transferred))
    }
}

fn report(options: &DownloadOptions, progress: DownloadProgress) {
    if let Some(sender) = &options.progress {
        // Snapshots are cumulative; losing one under backpressure is harmless
        let _ = sender.try_send(progress);
    }
}

/// Resolves once a stop is requested; never resolves without a receiver
async fn wait_for_stop(stop: &mut Option<watch::Receiver<bool>>) {
    match stop {
        Some(receiver) => {
            if receiver.wait_for(|stopped| *stopped).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Move a finished transfer to `destination`
///
/// Without `force` the file is hard-linked into place, which fails instead of
/// replacing a destination created by another transfer since the early check.
async fn place_file(temp_path: &Path, destination: &Path, force: bool) -> DownloadResult<()> {
    if !force {
        match fs::hard_link(temp_path, destination).await {
            Ok(()) => {
                remove_partial(temp_path).await;
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DownloadError::DestinationExists {
                    path: destination.to_path_buf(),
                });
            }
            Err(e) => {
                debug!(
                    "Hard link into {} failed ({}), falling back to rename",
                    destination.display(),
                    e
                );
                if fs::try_exists(destination).await.unwrap_or(false) {
                    return Err(DownloadError::DestinationExists {
                        path: destination.to_path_buf(),
                    });
                }
            }
        }
    }

    fs::rename(temp_path, destination)
        .await
        .map_err(|e| DownloadError::file_system(destination, e))
}

/// Unique temporary path for one transfer into `destination`
///
/// The name still ends in the temporary suffix so archive operations can
/// recognise it.
pub fn transfer_temp_path(destination: &Path) -> PathBuf {
    static NEXT_TRANSFER: AtomicU64 = AtomicU64::new(1);

    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(
        ".{}-{}{}",
        std::process::id(),
        NEXT_TRANSFER.fetch_add(1, Ordering::Relaxed),
        files::TEMP_FILE_SUFFIX
    ));
    destination.with_file_name(name)
}

/// Temporary path for a single-writer file such as the catalog
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(files::TEMP_FILE_SUFFIX);
    destination.with_file_name(name)
}

async fn remove_partial(temp_path: &Path) {
    match fs::remove_file(temp_path).await {
        Ok(()) => debug!("Removed partial file {}", temp_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove partial file {}: {}",
            temp_path.display(),
            e
        ),
    }
}
