//! Integration tests for the archive catalog and its service operations
//!
//! These tests cover deletion guards, idempotent record writes, listing
//! comparison and catalog reconciliation against a scratch archive.

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use iso_fetcher::app::archive::{ArchiveCatalog, ArchiveRecord};
use iso_fetcher::app::hash::HashAlgorithm;
use iso_fetcher::app::service::{ArchiveService, ServiceConfig};
use iso_fetcher::errors::CatalogError;

fn record(name: &str, filename: &str, version: Option<&str>) -> ArchiveRecord {
    ArchiveRecord::new(
        name,
        filename,
        "ab".repeat(32),
        HashAlgorithm::Sha256,
        version.map(str::to_string),
        100,
    )
}

#[tokio::test]
async fn test_delete_rejects_path_traversal() {
    let root = TempDir::new().unwrap();
    let archive_dir = root.path().join("srv").join("isos");
    std::fs::create_dir_all(&archive_dir).unwrap();
    std::fs::create_dir_all(root.path().join("etc")).unwrap();
    std::fs::write(root.path().join("etc").join("passwd"), b"root:x:0:0").unwrap();

    let service = ArchiveService::new(ServiceConfig::new(&archive_dir)).unwrap();
    service
        .tracker()
        .catalog()
        .add(record("passwd", "passwd", None))
        .await
        .unwrap();

    for attempt in ["../../etc/passwd", "/etc/passwd", "..", "sub/../passwd"] {
        let err = service.delete_archive_entry(attempt).await.unwrap_err();
        assert!(
            matches!(err, CatalogError::PathTraversal { .. }),
            "{} was not rejected",
            attempt
        );
    }

    assert!(root.path().join("etc").join("passwd").exists());
    assert_eq!(service.list_archive().await.len(), 1);
}

#[tokio::test]
async fn test_delete_record_without_file() {
    let archive = TempDir::new().unwrap();
    let service = ArchiveService::new(ServiceConfig::new(archive.path())).unwrap();
    service
        .tracker()
        .catalog()
        .add(record("Orphan", "orphan.iso", None))
        .await
        .unwrap();

    service.delete_archive_entry("orphan.iso").await.unwrap();
    assert!(service.list_archive().await.is_empty());

    let err = service.delete_archive_entry("orphan.iso").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { .. }));
}

#[tokio::test]
async fn test_adding_same_record_is_idempotent() {
    let archive = TempDir::new().unwrap();
    let catalog = ArchiveCatalog::new(archive.path().join("isos.json"));
    let first = record("Distro", "distro-1.0.iso", Some("1.0"));

    catalog.add(first.clone()).await.unwrap();
    catalog.add(first.clone()).await.unwrap();
    assert_eq!(catalog.list().await, vec![first.clone()]);

    let mut replacement = first.clone();
    replacement.hash = "cd".repeat(32);
    catalog.add(replacement.clone()).await.unwrap();
    assert_eq!(catalog.list().await, vec![replacement]);

    let reopened = ArchiveCatalog::new(archive.path().join("isos.json"));
    assert_eq!(reopened.list().await.len(), 1);
}

#[tokio::test]
async fn test_check_updates_against_fetched_listing() {
    let server = MockServer::start().await;
    let listing = json!({
        "Distro Workstation": {
            "url": format!("{}/40/Distro-Workstation-Live-x86_64-40.1.iso", server.uri()),
            "version": "40.1",
            "size": 100
        },
        "Other OS": {
            "url": format!("{}/other-1.0.iso", server.uri()),
            "hash": "EF".repeat(32),
            "hashAlgorithm": "sha256"
        },
        "Same OS": {
            "url": format!("{}/same-2.0.iso", server.uri()),
            "version": "2.0"
        },
        "Broken": { "hash": "00" }
    });
    Mock::given(path("/isos.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing))
        .mount(&server)
        .await;

    let archive = TempDir::new().unwrap();
    let service = ArchiveService::new(ServiceConfig::new(archive.path())).unwrap();
    let catalog = service.tracker().catalog();
    catalog
        .add(record(
            "Distro Workstation",
            "Distro-Workstation-Live-x86_64-40.0.iso",
            Some("40.0"),
        ))
        .await
        .unwrap();
    catalog
        .add(record("Same OS", "same-2.0.iso", Some("2.0")))
        .await
        .unwrap();

    let entries = service
        .fetch_listing(Some(&format!("{}/isos.json", server.uri())))
        .await
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].expected_hash, Some("ef".repeat(32)));

    let statuses = service.check_updates(&entries).await;
    let summary: Vec<(&str, bool, bool)> = statuses
        .iter()
        .map(|s| (s.name.as_str(), s.in_archive, s.update_available))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Distro Workstation", true, true),
            ("Other OS", false, false),
            ("Same OS", true, false),
        ]
    );
    assert_eq!(
        statuses[0].archived.as_ref().map(|r| r.filename.as_str()),
        Some("Distro-Workstation-Live-x86_64-40.0.iso")
    );
}

#[tokio::test]
async fn test_reconcile_drops_missing_files() {
    let archive = TempDir::new().unwrap();
    let service = ArchiveService::new(ServiceConfig::new(archive.path())).unwrap();
    let catalog = service.tracker().catalog();

    std::fs::write(archive.path().join("kept.iso"), b"kept").unwrap();
    catalog.add(record("Kept", "kept.iso", None)).await.unwrap();
    catalog.add(record("Gone", "gone.iso", None)).await.unwrap();

    let removed = service.reconcile_archive().await.unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].filename, "gone.iso");

    let remaining = service.list_archive().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].filename, "kept.iso");
}
