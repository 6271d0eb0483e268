//! Local image archive
//!
//! The archive is a directory of downloaded images plus a JSON catalog
//! describing them. This module provides:
//!
//! - `record`: the persisted [`ArchiveRecord`] schema and [`ListingStatus`]
//! - `catalog`: the single-writer [`ArchiveCatalog`] store
//! - `compare`: version comparison and name normalization for update checks

use std::path::PathBuf;

use crate::constants::files;

pub mod catalog;
pub mod compare;
pub mod record;

pub use catalog::ArchiveCatalog;
pub use compare::{compare_versions, extract_version, is_update, normalize_name};
pub use record::{ArchiveRecord, CatalogDocument, ListingStatus};

/// Where archived images and their catalog live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Directory holding the downloaded images
    pub archive_dir: PathBuf,
    /// Catalog document path
    pub catalog_file: PathBuf,
}

impl ArchiveConfig {
    /// Archive in `archive_dir` with the catalog stored inside it
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        let archive_dir = archive_dir.into();
        let catalog_file = archive_dir.join(files::CATALOG_FILE_NAME);
        Self {
            archive_dir,
            catalog_file,
        }
    }

    /// Store the catalog somewhere other than the archive directory
    pub fn with_catalog_file(mut self, catalog_file: impl Into<PathBuf>) -> Self {
        self.catalog_file = catalog_file.into();
        self
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        let archive_dir = dirs::data_dir()
            .map(|dir| dir.join(files::APP_DIR_NAME).join("isos"))
            .unwrap_or_else(|| PathBuf::from("./isos"));
        Self::new(archive_dir)
    }
}
