//! Persisted archive catalog
//!
//! The catalog is a single JSON document (`{"isos": [...]}`) next to the
//! archived images. Reads are tolerant: a missing or corrupt document is
//! treated as an empty catalog. Writes are serialized through one lock and
//! replace the whole document with a temp-file-then-rename, so concurrent job
//! completions cannot lose each other's records and the document is never
//! half written.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::app::archive::compare::{is_update, normalize_name};
use crate::app::archive::record::{ArchiveRecord, CatalogDocument, ListingStatus};
use crate::app::client::download::temp_path_for;
use crate::app::models::ListingEntry;
use crate::errors::{CatalogError, CatalogResult};

/// Single-writer store of [`ArchiveRecord`]s
#[derive(Debug)]
pub struct ArchiveCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ArchiveCatalog {
    /// Open the catalog stored at `path`; the file need not exist yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the catalog document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record, treating a missing or unreadable document as empty
    pub async fn load(&self) -> Vec<ArchiveRecord> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No catalog at {}, starting empty", self.path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read catalog {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<CatalogDocument>(&content) {
            Ok(document) => document.isos,
            Err(e) => {
                warn!(
                    "Catalog {} is corrupt, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// All records in stored order
    pub async fn list(&self) -> Vec<ArchiveRecord> {
        self.load().await
    }

    /// Insert `record`, replacing any record with the same filename wholesale
    pub async fn add(&self, record: ArchiveRecord) -> CatalogResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;

        let replaced = records.iter().any(|r| r.filename == record.filename);
        records.retain(|r| r.filename != record.filename);
        info!(
            "{} archive record for {}",
            if replaced { "Replacing" } else { "Adding" },
            record.filename
        );
        records.push(record);

        self.save(records).await
    }

    /// Remove the record for `filename`
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] when no record has that filename.
    pub async fn remove(&self, filename: &str) -> CatalogResult<ArchiveRecord> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await;

        let position = records
            .iter()
            .position(|r| r.filename == filename)
            .ok_or_else(|| CatalogError::NotFound {
                filename: filename.to_string(),
            })?;
        let removed = records.remove(position);

        self.save(records).await?;
        info!("Removed archive record for {}", filename);
        Ok(removed)
    }

    /// Record stored under exactly `filename`
    pub async fn find_by_filename(&self, filename: &str) -> Option<ArchiveRecord> {
        self.load()
            .await
            .into_iter()
            .find(|r| r.filename == filename)
    }

    /// Most recently added record whose name or filename normalizes like `name`
    pub async fn find_by_normalized_name(&self, name: &str) -> Option<ArchiveRecord> {
        let records = self.load().await;
        match_normalized(&records, name).cloned()
    }

    /// Compare a listing against the archive
    ///
    /// Entries match by exact filename first, then by normalized name.
    pub async fn diff_against_listing(&self, listing: &[ListingEntry]) -> Vec<ListingStatus> {
        let records = self.load().await;

        listing
            .iter()
            .map(|entry| {
                let filename = entry.filename();
                let archived = filename
                    .as_deref()
                    .and_then(|filename| records.iter().find(|r| r.filename == filename))
                    .or_else(|| match_normalized(&records, &entry.name))
                    .or_else(|| {
                        filename
                            .as_deref()
                            .and_then(|filename| match_normalized(&records, filename))
                    });

                ListingStatus {
                    name: entry.name.clone(),
                    filename,
                    in_archive: archived.is_some(),
                    update_available: archived.is_some_and(|record| is_update(record, entry)),
                    archived: archived.cloned(),
                }
            })
            .collect()
    }

    /// Drop records whose file is no longer in `archive_dir`
    ///
    /// Returns the removed records; the document is only rewritten when
    /// something was removed.
    pub async fn reconcile(&self, archive_dir: &Path) -> CatalogResult<Vec<ArchiveRecord>> {
        let _guard = self.write_lock.lock().await;
        let records = self.load().await;

        let mut kept = Vec::with_capacity(records.len());
        let mut removed = Vec::new();
        for record in records {
            let exists = fs::try_exists(archive_dir.join(&record.filename))
                .await
                .unwrap_or(false);
            if exists {
                kept.push(record);
            } else {
                removed.push(record);
            }
        }

        if !removed.is_empty() {
            self.save(kept).await?;
            info!(
                "Removed {} archive records with missing files",
                removed.len()
            );
        }
        Ok(removed)
    }

    /// Replace the document atomically; callers hold the write lock
    async fn save(&self, records: Vec<ArchiveRecord>) -> CatalogResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CatalogError::io(parent, e))?;
        }

        let content = serde_json::to_vec_pretty(&CatalogDocument { isos: records })?;
        let temp_path = temp_path_for(&self.path);

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&content).await?;
            file.sync_all().await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CatalogError::io(&temp_path, e));
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| CatalogError::io(&self.path, e))?;
        debug!("Wrote catalog {}", self.path.display());
        Ok(())
    }
}

fn match_normalized<'a>(records: &'a [ArchiveRecord], name: &str) -> Option<&'a ArchiveRecord> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
        return None;
    }
    records
        .iter()
        .filter(|r| normalize_name(&r.name) == wanted || normalize_name(&r.filename) == wanted)
        .max_by_key(|r| r.added_date)
}
