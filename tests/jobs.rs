//! Integration tests for download jobs run through the archive service
//!
//! Each test builds a service over a scratch archive directory and a local
//! fixture server, submits a job and polls it to completion.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use iso_fetcher::app::hash::HashAlgorithm;
use iso_fetcher::app::jobs::{DownloadJob, JobId, JobStatus, SubmitOptions};
use iso_fetcher::app::models::ListingEntry;
use iso_fetcher::app::service::{ArchiveService, ServiceConfig};
use iso_fetcher::errors::JobError;

const POLL: Duration = Duration::from_millis(20);

fn service(archive_dir: &std::path::Path) -> ArchiveService {
    let mut config = ServiceConfig::new(archive_dir);
    config.client = config.client.with_rate_limit(1000);
    config.tracker.discover_hashes = false;
    ArchiveService::new(config).unwrap()
}

async fn wait(service: &ArchiveService, id: JobId) -> DownloadJob {
    tokio::time::timeout(
        Duration::from_secs(30),
        service.tracker().poll_until_finished(id, POLL),
    )
    .await
    .expect("job did not finish in time")
    .unwrap()
}

#[tokio::test]
async fn test_large_download_is_verified_and_archived() {
    let server = MockServer::start().await;
    let body: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 253) as u8).collect();
    let digest = hex::encode(Sha256::digest(&body));

    Mock::given(path("/releases/40/distro-40.1-x86_64.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = service(archive.path());
    let entry = ListingEntry::from_url(
        &format!("{}/releases/40/distro-40.1-x86_64.iso", server.uri()),
        HashAlgorithm::Sha256,
    )
    .with_expected_hash(digest.to_uppercase());

    let id = service.submit_entry(entry, SubmitOptions::default()).await;
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.bytes_transferred, body.len() as u64);
    assert_eq!(job.total_bytes, body.len() as u64);
    assert_eq!(job.eta_seconds, Some(0.0));
    let outcome = job.result.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.hash, digest);

    let records = service.list_archive().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "distro-40.1-x86_64.iso");
    assert_eq!(records[0].hash, digest);
    assert_eq!(records[0].size, body.len() as u64);
    assert!(archive.path().join("distro-40.1-x86_64.iso").exists());
}

#[tokio::test]
async fn test_hash_mismatch_completes_without_record() {
    let server = MockServer::start().await;
    Mock::given(path("/bad.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = service(archive.path());
    let wrong = "0".repeat(64);
    let id = service
        .submit_download(
            &format!("{}/bad.iso", server.uri()),
            SubmitOptions::default().with_expected_hash(wrong.clone()),
        )
        .await;
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let outcome = job.result.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.expected_hash, Some(wrong));
    assert_eq!(outcome.hash, hex::encode(Sha256::digest(b"tampered")));
    assert!(service.list_archive().await.is_empty());
}

#[tokio::test]
async fn test_download_outside_archive_is_not_catalogued() {
    let server = MockServer::start().await;
    Mock::given(path("/side.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"side".to_vec()))
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let service = service(archive.path());
    let id = service
        .submit_download(
            &format!("{}/side.iso", server.uri()),
            SubmitOptions::default().with_output_directory(elsewhere.path()),
        )
        .await;
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(elsewhere.path().join("side.iso").exists());
    assert!(service.list_archive().await.is_empty());
}

#[tokio::test]
async fn test_cancel_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/slow.iso"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.iso"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![7u8; 4096])
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = service(archive.path());
    let id = service
        .submit_download(&format!("{}/slow.iso", server.uri()), SubmitOptions::default())
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    service.tracker().cancel(id).await.unwrap();
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.result.is_none());
    assert!(!archive.path().join("slow.iso").exists());
    assert!(!archive.path().join("slow.iso.tmp").exists());

    let err = service.tracker().cancel(id).await.unwrap_err();
    assert!(matches!(err, JobError::AlreadyFinished { .. }));
}

#[tokio::test]
async fn test_failed_job_reports_error() {
    let server = MockServer::start().await;
    Mock::given(path("/gone.iso"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = service(archive.path());
    let id = service
        .submit_download(&format!("{}/gone.iso", server.uri()), SubmitOptions::default())
        .await;
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap_or_default().contains("404"));
    assert!(job.result.is_none());

    let removed = service.tracker().remove(id).await.unwrap();
    assert_eq!(removed.id, id);
    assert!(matches!(
        service.job_status(id).await,
        Err(JobError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_discovered_hash_is_used_for_verification() {
    let server = MockServer::start().await;
    let body = b"discovered image".to_vec();
    let digest = hex::encode(Sha256::digest(&body));

    Mock::given(path("/pub/tool-1.0.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    Mock::given(path("/pub/tool-1.0.iso.sha256"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("{}  tool-1.0.iso\n", digest)),
        )
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = service(archive.path());
    let id = service
        .submit_download(
            &format!("{}/pub/tool-1.0.iso", server.uri()),
            SubmitOptions::default().with_discovery(true),
        )
        .await;
    let job = wait(&service, id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.expected_hash.as_deref(), Some(digest.as_str()));
    assert!(job.result.unwrap().is_verified());
    assert_eq!(service.list_archive().await[0].hash, digest);
}
