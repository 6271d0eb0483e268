//! Archive service facade
//!
//! [`ArchiveService`] wires the HTTP client, download engine, hash discovery,
//! archive catalog and job tracker together and exposes the operations that
//! outer layers (the CLI, or an HTTP router) build on: submitting downloads,
//! polling jobs, verifying files, listing and deleting archive entries, and
//! comparing a remote listing against the archive.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::app::archive::{ArchiveCatalog, ArchiveConfig, ArchiveRecord, ListingStatus};
use crate::app::client::{build_engine, ClientConfig, HttpHandler};
use crate::app::discovery::{DiscoveredHash, HashDiscovery};
use crate::app::hash::{HashAlgorithm, HashVerifier, VerificationOutcome};
use crate::app::jobs::{DownloadJob, JobId, JobTracker, SubmitOptions, TrackerConfig};
use crate::app::models::{parse_listing, ListingEntry};
use crate::constants::{discovery, files, limits};
use crate::errors::{
    AppError, CatalogError, CatalogResult, DownloadError, DownloadResult, JobResult, Result,
};

/// Runtime settings for [`ArchiveService`]
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub client: ClientConfig,
    pub archive: ArchiveConfig,
    /// `default_output_dir` is replaced by the archive directory
    pub tracker: TrackerConfig,
    /// Algorithm for bare URLs and listing rows that name none
    pub default_algorithm: HashAlgorithm,
    /// First candidate template for hash discovery
    pub hash_file_pattern: String,
    /// Listing fetched when no URL is given
    pub listing_url: Option<String>,
}

impl ServiceConfig {
    /// Defaults with the archive stored in `archive_dir`
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: ClientConfig::default(),
            archive: ArchiveConfig::new(archive_dir),
            tracker: TrackerConfig::default(),
            default_algorithm: HashAlgorithm::default(),
            hash_file_pattern: discovery::DEFAULT_HASH_FILE_PATTERN.to_string(),
            listing_url: None,
        }
    }
}

/// Entry point for download and archive operations
#[derive(Debug, Clone)]
pub struct ArchiveService {
    http: Arc<HttpHandler>,
    catalog: Arc<ArchiveCatalog>,
    discovery: HashDiscovery,
    tracker: JobTracker,
    archive: ArchiveConfig,
    default_algorithm: HashAlgorithm,
    listing_url: Option<String>,
}

impl ArchiveService {
    /// Build every component from `config`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Network` if the HTTP client cannot be built.
    pub fn new(config: ServiceConfig) -> DownloadResult<Self> {
        let (http, resolver, engine) = build_engine(&config.client)?;
        let catalog = Arc::new(ArchiveCatalog::new(config.archive.catalog_file.clone()));
        let discovery = HashDiscovery::new(http.clone(), resolver, config.hash_file_pattern);

        let tracker_config = TrackerConfig {
            default_output_dir: config.archive.archive_dir.clone(),
            ..config.tracker
        };
        let tracker = JobTracker::new(
            engine,
            catalog.clone(),
            Some(discovery.clone()),
            tracker_config,
        );

        info!(
            "Archive service ready (archive {}, catalog {})",
            config.archive.archive_dir.display(),
            config.archive.catalog_file.display()
        );

        Ok(Self {
            http,
            catalog,
            discovery,
            tracker,
            archive: config.archive,
            default_algorithm: config.default_algorithm,
            listing_url: config.listing_url,
        })
    }

    /// Archive locations
    pub fn archive(&self) -> &ArchiveConfig {
        &self.archive
    }

    /// Algorithm used when a request names none
    pub fn default_algorithm(&self) -> HashAlgorithm {
        self.default_algorithm
    }

    /// Job registry, for cancel/pause/list/prune
    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Start downloading a bare URL into the archive
    pub async fn submit_download(&self, url: &str, options: SubmitOptions) -> JobId {
        let algorithm = options.hash_algorithm.unwrap_or(self.default_algorithm);
        let entry = ListingEntry::from_url(url, algorithm);
        self.tracker.submit(entry, options).await
    }

    /// Start downloading a listing entry into the archive
    pub async fn submit_entry(&self, entry: ListingEntry, options: SubmitOptions) -> JobId {
        self.tracker.submit(entry, options).await
    }

    /// Latest snapshot of a job
    pub async fn job_status(&self, id: JobId) -> JobResult<DownloadJob> {
        self.tracker.status(id).await
    }

    /// Re-hash a file and compare it with `expected_hash`
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::FileSystem` if the file cannot be read.
    pub async fn verify_file(
        &self,
        path: &Path,
        expected_hash: &str,
        algorithm: HashAlgorithm,
    ) -> DownloadResult<VerificationOutcome> {
        let outcome = HashVerifier::verify_file(path, expected_hash, algorithm)
            .await
            .map_err(|e| DownloadError::file_system(path, e))?;

        if outcome.is_valid {
            info!("{} matches its {} digest", path.display(), algorithm);
        } else {
            warn!(
                "{} does not match: expected {}, got {}",
                path.display(),
                outcome.expected,
                outcome.hash
            );
        }
        Ok(outcome)
    }

    /// Every archived image
    pub async fn list_archive(&self) -> Vec<ArchiveRecord> {
        self.catalog.list().await
    }

    /// Delete an archived file and its catalog record
    ///
    /// `filename` must be a plain file name inside the archive directory.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::PathTraversal`] for anything but a plain file name;
    ///   nothing is touched in that case
    /// - [`CatalogError::NotFound`] when neither a file nor a record exists,
    ///   and for the catalog or a temporary transfer file
    /// - [`CatalogError::Io`] when the file exists but cannot be removed
    pub async fn delete_archive_entry(&self, filename: &str) -> CatalogResult<()> {
        if !is_plain_file_name(filename) {
            warn!("Rejected archive delete outside the archive: {}", filename);
            return Err(CatalogError::PathTraversal {
                filename: filename.to_string(),
            });
        }

        // The catalog and in-flight temporary files are not archive entries
        let path = self.archive.archive_dir.join(filename);
        if path == self.archive.catalog_file || filename.ends_with(files::TEMP_FILE_SUFFIX) {
            return Err(CatalogError::NotFound {
                filename: filename.to_string(),
            });
        }

        let file_removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(CatalogError::io(&path, e)),
        };

        let record_removed = match self.catalog.remove(filename).await {
            Ok(_) => true,
            Err(CatalogError::NotFound { .. }) => false,
            Err(e) => return Err(e),
        };

        if !file_removed && !record_removed {
            return Err(CatalogError::NotFound {
                filename: filename.to_string(),
            });
        }

        info!(
            "Deleted {} (file: {}, record: {})",
            filename, file_removed, record_removed
        );
        Ok(())
    }

    /// Drop catalog records whose files have disappeared
    pub async fn reconcile_archive(&self) -> CatalogResult<Vec<ArchiveRecord>> {
        self.catalog.reconcile(&self.archive.archive_dir).await
    }

    /// Fetch and parse a listing; `None` uses the configured listing URL
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is available, the fetch fails or the
    /// document is not a valid listing.
    pub async fn fetch_listing(&self, url: Option<&str>) -> Result<Vec<ListingEntry>> {
        let url = url
            .or(self.listing_url.as_deref())
            .ok_or_else(|| AppError::generic("no listing URL configured"))?;
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        let content = self
            .http
            .get_text(&parsed, limits::MAX_TEXT_DOCUMENT_BYTES)
            .await?;
        let entries = parse_listing(&content, self.default_algorithm)?;
        debug!("Listing {} has {} entries", url, entries.len());
        Ok(entries)
    }

    /// Archive state of every listing entry
    pub async fn check_updates(&self, listing: &[ListingEntry]) -> Vec<ListingStatus> {
        self.catalog.diff_against_listing(listing).await
    }

    /// Look for a published checksum for `url`
    pub async fn discover_hash(
        &self,
        url: &str,
        algorithm: Option<HashAlgorithm>,
    ) -> Option<DiscoveredHash> {
        self.discovery
            .discover_hash(url, algorithm.unwrap_or(self.default_algorithm))
            .await
    }
}

/// True when `filename` is exactly one normal path component
fn is_plain_file_name(filename: &str) -> bool {
    if filename.is_empty() || filename.contains(&['/', '\\', '\0'][..]) {
        return false;
    }
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("ubuntu-22.04.iso"));
        assert!(is_plain_file_name("..hidden.iso"));

        for rejected in [
            "",
            ".",
            "..",
            "../../etc/passwd",
            "/etc/passwd",
            "sub/file.iso",
            "..\\windows.iso",
        ] {
            assert!(!is_plain_file_name(rejected), "{:?} should be rejected", rejected);
        }
    }

    #[tokio::test]
    async fn test_delete_refuses_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let service = ArchiveService::new(ServiceConfig::new(temp_dir.path())).unwrap();
        service
            .catalog
            .add(ArchiveRecord::new("a", "a.iso", "00", HashAlgorithm::Sha256, None, 4))
            .await
            .unwrap();

        let in_flight = "a.iso.4242-1.tmp";
        std::fs::write(temp_dir.path().join(in_flight), b"partial").unwrap();
        let catalog_temp = format!("{}{}", files::CATALOG_FILE_NAME, files::TEMP_FILE_SUFFIX);
        std::fs::write(temp_dir.path().join(&catalog_temp), b"{}").unwrap();

        for name in [in_flight, catalog_temp.as_str()] {
            let err = service.delete_archive_entry(name).await.unwrap_err();
            assert!(matches!(err, CatalogError::NotFound { .. }));
            assert!(temp_dir.path().join(name).exists());
        }
        assert_eq!(service.list_archive().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_record() {
        let temp_dir = TempDir::new().unwrap();
        let service = ArchiveService::new(ServiceConfig::new(temp_dir.path())).unwrap();

        std::fs::write(temp_dir.path().join("a.iso"), b"data").unwrap();
        service
            .catalog
            .add(ArchiveRecord::new("a", "a.iso", "00", HashAlgorithm::Sha256, None, 4))
            .await
            .unwrap();

        service.delete_archive_entry("a.iso").await.unwrap();
        assert!(!temp_dir.path().join("a.iso").exists());
        assert!(service.list_archive().await.is_empty());

        let err = service.delete_archive_entry("a.iso").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_fetch_listing_requires_url() {
        let temp_dir = TempDir::new().unwrap();
        let service = ArchiveService::new(ServiceConfig::new(temp_dir.path())).unwrap();
        assert!(service.fetch_listing(None).await.is_err());
    }
}
