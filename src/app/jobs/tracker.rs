//! Download job registry
//!
//! The tracker owns every job it creates. Each submission becomes a tokio task
//! that waits for a slot in a bounded pool, optionally discovers the expected
//! hash, runs the download engine and finally commits the result to the
//! archive catalog. Progress flows from the engine over a channel and is
//! folded into the job snapshot that callers poll with [`JobTracker::status`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::app::archive::{ArchiveCatalog, ArchiveRecord};
use crate::app::client::{DownloadEngine, DownloadOptions, DownloadOutcome, DownloadProgress};
use crate::app::discovery::HashDiscovery;
use crate::app::hash::HashAlgorithm;
use crate::app::jobs::types::{DownloadJob, JobId, JobStatus, SubmitOptions, TrackerConfig};
use crate::app::models::ListingEntry;
use crate::constants::download;
use crate::errors::{CatalogResult, DownloadError, JobError, JobResult};

struct JobEntry {
    job: DownloadJob,
    stop_tx: watch::Sender<bool>,
    /// Terminal status requested by `cancel` or `pause`
    stop_status: Option<JobStatus>,
}

struct TrackerInner {
    engine: DownloadEngine,
    catalog: Arc<ArchiveCatalog>,
    discovery: Option<HashDiscovery>,
    config: TrackerConfig,
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    permits: Arc<Semaphore>,
}

/// Everything a job task needs besides the shared tracker state
struct JobPlan {
    id: JobId,
    entry: ListingEntry,
    output_directory: PathBuf,
    options: SubmitOptions,
}

/// Registry of in-flight and finished download jobs
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("config", &self.inner.config)
            .field("available_slots", &self.inner.permits.available_permits())
            .finish()
    }
}

impl JobTracker {
    /// Create a tracker; `discovery` is optional so hash lookup can be disabled
    pub fn new(
        engine: DownloadEngine,
        catalog: Arc<ArchiveCatalog>,
        discovery: Option<HashDiscovery>,
        config: TrackerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            inner: Arc::new(TrackerInner {
                engine,
                catalog,
                discovery,
                config,
                jobs: RwLock::new(HashMap::new()),
                permits,
            }),
        }
    }

    /// Runtime settings
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Catalog that successful jobs are committed to
    pub fn catalog(&self) -> &Arc<ArchiveCatalog> {
        &self.inner.catalog
    }

    /// Create a job for `entry` and start it in the background
    ///
    /// The job starts in `initializing` and stays there while it waits for a
    /// free slot. Must be called from within a tokio runtime.
    pub async fn submit(&self, entry: ListingEntry, options: SubmitOptions) -> JobId {
        let id = JobId::next();
        let output_directory = options
            .output_directory
            .clone()
            .unwrap_or_else(|| self.inner.config.default_output_dir.clone());
        let hash_algorithm = options.hash_algorithm.unwrap_or(entry.hash_algorithm);
        let expected_hash = options
            .expected_hash
            .clone()
            .or_else(|| entry.expected_hash.clone());

        let job = DownloadJob::new(
            id,
            entry.name.clone(),
            entry.url.clone(),
            output_directory.clone(),
            hash_algorithm,
            expected_hash,
        );
        let (stop_tx, stop_rx) = watch::channel(false);

        self.inner.jobs.write().await.insert(
            id,
            JobEntry {
                job,
                stop_tx,
                stop_status: None,
            },
        );
        info!("Job {} created for {} ({})", id, entry.name, entry.url);

        let inner = self.inner.clone();
        let plan = JobPlan {
            id,
            entry,
            output_directory,
            options,
        };
        tokio::spawn(async move {
            inner.run(plan, stop_rx).await;
        });

        id
    }

    /// Latest snapshot of a job
    pub async fn status(&self, id: JobId) -> JobResult<DownloadJob> {
        self.inner
            .jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.job.clone())
            .ok_or(JobError::NotFound { id: id.as_u64() })
    }

    /// Snapshots of every tracked job, oldest first
    pub async fn list(&self) -> Vec<DownloadJob> {
        let mut jobs: Vec<DownloadJob> = self
            .inner
            .jobs
            .read()
            .await
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Stop a job; it ends in `cancelled` and its partial file is removed
    pub async fn cancel(&self, id: JobId) -> JobResult<()> {
        self.request_stop(id, JobStatus::Cancelled).await
    }

    /// Stop a job; it ends in `paused` and needs a new job to continue
    pub async fn pause(&self, id: JobId) -> JobResult<()> {
        self.request_stop(id, JobStatus::Paused).await
    }

    async fn request_stop(&self, id: JobId, status: JobStatus) -> JobResult<()> {
        let mut jobs = self.inner.jobs.write().await;
        let entry = jobs
            .get_mut(&id)
            .ok_or(JobError::NotFound { id: id.as_u64() })?;

        if entry.job.status.is_terminal() {
            return Err(JobError::AlreadyFinished {
                id: id.as_u64(),
                status: entry.job.status.to_string(),
            });
        }

        entry.stop_status.get_or_insert(status);
        entry.stop_tx.send_replace(true);
        info!("Job {} stop requested ({})", id, status);
        Ok(())
    }

    /// Evict a finished job from the registry
    pub async fn remove(&self, id: JobId) -> JobResult<DownloadJob> {
        let mut jobs = self.inner.jobs.write().await;
        let status = jobs
            .get(&id)
            .map(|entry| entry.job.status)
            .ok_or(JobError::NotFound { id: id.as_u64() })?;

        if !status.is_terminal() {
            return Err(JobError::StillRunning { id: id.as_u64() });
        }

        let entry = jobs
            .remove(&id)
            .ok_or(JobError::NotFound { id: id.as_u64() })?;
        debug!("Job {} evicted", id);
        Ok(entry.job)
    }

    /// Evict every finished job, returning how many were removed
    pub async fn prune_finished(&self) -> usize {
        let mut jobs = self.inner.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.job.status.is_terminal());
        let removed = before - jobs.len();
        if removed > 0 {
            debug!("Pruned {} finished jobs", removed);
        }
        removed
    }

    /// Poll a job every `interval` until it reaches a terminal state
    pub async fn poll_until_finished(
        &self,
        id: JobId,
        interval: Duration,
    ) -> JobResult<DownloadJob> {
        loop {
            let job = self.status(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

impl TrackerInner {
    async fn run(&self, plan: JobPlan, mut stop_rx: watch::Receiver<bool>) {
        let id = plan.id;

        let _permit = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => {
                self.finish_stopped(id).await;
                return;
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.finish_error(id, "job tracker is shutting down".to_string()).await;
                    return;
                }
            },
        };
        debug!("Job {} acquired a download slot", id);

        let Some(snapshot) = self.snapshot(id).await else {
            return;
        };
        let mut expected_hash = snapshot.expected_hash.clone();

        if expected_hash.is_none() && self.should_discover(&plan.options) {
            let discovered = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => {
                    self.finish_stopped(id).await;
                    return;
                }
                found = self.discover(&plan, snapshot.hash_algorithm) => found,
            };
            if let Some(hash) = discovered {
                self.update(id, |job| job.expected_hash = Some(hash.clone()))
                    .await;
                expected_hash = Some(hash);
            }
        }

        let (progress_tx, mut progress_rx) =
            mpsc::channel::<DownloadProgress>(download::PROGRESS_CHANNEL_CAPACITY);
        let options = DownloadOptions::new(snapshot.hash_algorithm)
            .with_expected_hash(expected_hash)
            .with_force(plan.options.force)
            .with_timeout(plan.options.timeout.unwrap_or(self.config.timeout))
            .with_progress(progress_tx)
            .with_stop(stop_rx.clone());

        let transfer = self
            .engine
            .download(&plan.entry.url, &plan.output_directory, options);
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                result = &mut transfer => break result,
                Some(progress) = progress_rx.recv() => self.record_progress(id, progress).await,
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.record_progress(id, progress).await;
        }

        match result {
            Ok(outcome) => self.finish_download(&plan, outcome).await,
            Err(DownloadError::Cancelled) => self.finish_stopped(id).await,
            Err(e) => self.finish_error(id, e.to_string()).await,
        }
    }

    fn should_discover(&self, options: &SubmitOptions) -> bool {
        self.discovery.is_some() && options.discover_hash.unwrap_or(self.config.discover_hashes)
    }

    async fn discover(&self, plan: &JobPlan, algorithm: HashAlgorithm) -> Option<String> {
        let discovery = self.discovery.as_ref()?;
        let pattern = plan
            .options
            .hash_file_pattern
            .as_deref()
            .unwrap_or(discovery.pattern());
        let found = discovery
            .discover_with_pattern(&plan.entry.url, algorithm, pattern)
            .await;
        match found {
            Some(found) => {
                info!(
                    "Job {} will verify against {} from {}",
                    plan.id, found.hash, found.source_url
                );
                Some(found.hash)
            }
            None => {
                info!("Job {} has no published checksum, skipping verification", plan.id);
                None
            }
        }
    }

    async fn snapshot(&self, id: JobId) -> Option<DownloadJob> {
        self.jobs.read().await.get(&id).map(|entry| entry.job.clone())
    }

    /// Apply `change` to a job that has not reached a terminal state
    async fn update(&self, id: JobId, change: impl FnOnce(&mut DownloadJob)) {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(entry) if !entry.job.status.is_terminal() => change(&mut entry.job),
            Some(entry) => warn!(
                "Ignoring update to job {} in terminal state {}",
                id, entry.job.status
            ),
            None => debug!("Job {} was evicted before it finished", id),
        }
    }

    async fn record_progress(&self, id: JobId, progress: DownloadProgress) {
        self.update(id, |job| {
            if job.status == JobStatus::Initializing {
                job.status = JobStatus::Downloading;
                info!("Job {} downloading", id);
            }

            job.bytes_transferred = job.bytes_transferred.max(progress.bytes_transferred);
            job.total_bytes = progress.total_bytes;

            let elapsed = job.elapsed_seconds();
            if elapsed > 0.0 {
                job.speed = job.bytes_transferred as f64 / elapsed;
            }
            job.eta_seconds = (job.total_bytes > 0 && job.speed > 0.0).then(|| {
                job.total_bytes.saturating_sub(job.bytes_transferred) as f64 / job.speed
            });
        })
        .await;
    }

    async fn finish_download(&self, plan: &JobPlan, outcome: DownloadOutcome) {
        let id = plan.id;

        if outcome.success {
            if let Err(e) = self.commit(plan, &outcome).await {
                error!("Job {} could not update the archive catalog: {}", id, e);
                let message = format!(
                    "Downloaded {} but failed to update the catalog: {}",
                    outcome.filename, e
                );
                self.finish_error(id, message).await;
                return;
            }
        }

        let success = outcome.success;
        self.update(id, |job| {
            let elapsed = outcome.duration.as_secs_f64();
            job.status = JobStatus::Completed;
            job.bytes_transferred = outcome.size;
            job.total_bytes = job.total_bytes.max(outcome.size);
            job.speed = if elapsed > 0.0 {
                outcome.size as f64 / elapsed
            } else {
                0.0
            };
            job.eta_seconds = Some(0.0);
            job.error = None;
            job.result = Some(outcome);
        })
        .await;

        if success {
            info!("Job {} completed", id);
        } else {
            warn!("Job {} completed with a hash mismatch", id);
        }
    }

    /// Write the archive record for a verified or unverified download
    ///
    /// Files downloaded outside the archive directory are not catalogued.
    async fn commit(&self, plan: &JobPlan, outcome: &DownloadOutcome) -> CatalogResult<()> {
        if !same_directory(&plan.output_directory, &self.config.default_output_dir).await {
            debug!(
                "Job {} wrote outside the archive directory, not cataloguing {}",
                plan.id, outcome.filename
            );
            return Ok(());
        }

        let record = ArchiveRecord::new(
            plan.entry.name.clone(),
            outcome.filename.clone(),
            outcome.hash.clone(),
            outcome.hash_algorithm,
            plan.entry.version.clone(),
            outcome.size,
        );
        self.catalog.add(record).await
    }

    async fn finish_stopped(&self, id: JobId) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&id) {
            if entry.job.status.is_terminal() {
                return;
            }
            let status = entry.stop_status.unwrap_or(JobStatus::Cancelled);
            entry.job.status = status;
            entry.job.eta_seconds = None;
            info!("Job {} {}", id, status);
        }
    }

    async fn finish_error(&self, id: JobId, message: String) {
        warn!("Job {} failed: {}", id, message);
        self.update(id, |job| {
            job.status = JobStatus::Error;
            job.eta_seconds = None;
            job.error = Some(message);
        })
        .await;
    }
}

/// Compare directories after resolving `.`, `..` and symlinks
async fn same_directory(a: &Path, b: &Path) -> bool {
    let a = tokio::fs::canonicalize(a)
        .await
        .unwrap_or_else(|_| a.to_path_buf());
    let b = tokio::fs::canonicalize(b)
        .await
        .unwrap_or_else(|_| b.to_path_buf());
    a == b
}

/// Resolves once a stop is requested or the job's sender is gone
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::{build_engine, ClientConfig};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHUNK: usize = 16 * 1024;

    /// Serve every GET as `chunks` pieces of `CHUNK` bytes with a pause between them
    async fn trickle_server(chunks: usize, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut request = vec![0u8; 4096];
                    let read = socket.read(&mut request).await.unwrap_or(0);
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        chunks * CHUNK
                    );
                    if socket.write_all(head.as_bytes()).await.is_err()
                        || request[..read].starts_with(b"HEAD")
                    {
                        return;
                    }
                    let chunk = vec![b'x'; CHUNK];
                    for _ in 0..chunks {
                        if socket.write_all(&chunk).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(pause).await;
                    }
                });
            }
        });
        format!("http://{}", addr)
    }

    async fn wait_for(tracker: &JobTracker, id: JobId, status: JobStatus) -> DownloadJob {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let job = tracker.status(id).await.unwrap();
                if job.status == status {
                    return job;
                }
                assert!(!job.status.is_terminal(), "job ended in {}", job.status);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job never reached the expected status")
    }

    async fn finish(tracker: &JobTracker, id: JobId) -> DownloadJob {
        tokio::time::timeout(
            Duration::from_secs(20),
            tracker.poll_until_finished(id, Duration::from_millis(10)),
        )
        .await
        .expect("job did not finish in time")
        .unwrap()
    }

    fn entry(base: &str, name: &str) -> ListingEntry {
        ListingEntry::from_url(&format!("{}/{}", base, name), HashAlgorithm::Sha256)
    }

    fn tracker(temp_dir: &TempDir, max_concurrent_jobs: usize) -> JobTracker {
        let (_http, _resolver, engine) = build_engine(&ClientConfig::default()).unwrap();
        let catalog = Arc::new(ArchiveCatalog::new(temp_dir.path().join("isos.json")));
        let config = TrackerConfig {
            max_concurrent_jobs,
            discover_hashes: false,
            default_output_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        JobTracker::new(engine, catalog, None, config)
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir, 1);
        let id = JobId::from(u64::MAX);

        assert!(matches!(
            tracker.status(id).await,
            Err(JobError::NotFound { .. })
        ));
        assert!(matches!(
            tracker.cancel(id).await,
            Err(JobError::NotFound { .. })
        ));
        assert!(matches!(
            tracker.remove(id).await,
            Err(JobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_ends_in_error() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir, 1);
        let entry = ListingEntry::from_url("not a url", HashAlgorithm::Sha256);

        let id = tracker.submit(entry, SubmitOptions::default()).await;
        let job = tracker
            .poll_until_finished(id, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.is_some());
        assert!(job.result.is_none());
        assert!(tracker.catalog().list().await.is_empty());

        // terminal jobs refuse further transitions and can be evicted
        assert!(matches!(
            tracker.cancel(id).await,
            Err(JobError::AlreadyFinished { .. })
        ));
        assert_eq!(tracker.prune_finished().await, 1);
        assert!(tracker.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_progress_snapshots_never_go_backwards() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir, 1);
        let base = trickle_server(20, Duration::from_millis(25)).await;

        let id = tracker
            .submit(entry(&base, "disk.iso"), SubmitOptions::default())
            .await;

        let mut snapshots = Vec::new();
        let job = tokio::time::timeout(Duration::from_secs(20), async {
            loop {
                let job = tracker.status(id).await.unwrap();
                snapshots.push((job.status, job.bytes_transferred));
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish in time");

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.bytes_transferred, (20 * CHUNK) as u64);
        assert!(snapshots
            .iter()
            .any(|(status, bytes)| *status == JobStatus::Downloading && *bytes > 0));
        assert!(snapshots.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[tokio::test]
    async fn test_jobs_beyond_the_pool_wait_for_a_slot() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir, 1);
        let base = trickle_server(20, Duration::from_millis(25)).await;

        let first = tracker
            .submit(entry(&base, "first.iso"), SubmitOptions::default())
            .await;
        wait_for(&tracker, first, JobStatus::Downloading).await;
        let second = tracker
            .submit(entry(&base, "second.iso"), SubmitOptions::default())
            .await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let queued = tracker.status(second).await.unwrap();
        assert_eq!(queued.status, JobStatus::Initializing);
        assert_eq!(queued.bytes_transferred, 0);

        let first_job = finish(&tracker, first).await;
        let second_job = finish(&tracker, second).await;
        assert_eq!(first_job.status, JobStatus::Completed);
        assert_eq!(second_job.status, JobStatus::Completed);
        assert!(temp_dir.path().join("first.iso").exists());
        assert!(temp_dir.path().join("second.iso").exists());
    }

    #[tokio::test]
    async fn test_pause_removes_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let tracker = tracker(&temp_dir, 1);
        let base = trickle_server(200, Duration::from_millis(25)).await;

        let id = tracker
            .submit(entry(&base, "disk.iso"), SubmitOptions::default())
            .await;
        wait_for(&tracker, id, JobStatus::Downloading).await;

        tracker.pause(id).await.unwrap();
        let job = finish(&tracker, id).await;

        assert_eq!(job.status, JobStatus::Paused);
        assert!(job.result.is_none());
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
        assert!(matches!(
            tracker.cancel(id).await,
            Err(JobError::AlreadyFinished { .. })
        ));
    }

    #[tokio::test]
    async fn test_equivalent_archive_path_is_catalogued() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/disk.iso"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image".to_vec()))
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        let tracker = tracker(&temp_dir, 1);
        let options = SubmitOptions::default()
            .with_output_directory(temp_dir.path().join("sub").join(".."));

        let id = tracker
            .submit(entry(&server.uri(), "disk.iso"), options)
            .await;
        let job = finish(&tracker, id).await;

        assert_eq!(job.status, JobStatus::Completed);
        let records = tracker.catalog().list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "disk.iso");
    }
}
