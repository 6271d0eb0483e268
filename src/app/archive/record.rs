//! Persisted archive records and the catalog document schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::HashAlgorithm;

/// One downloaded image in the local archive
///
/// `filename` is the natural key: the catalog holds at most one record per
/// filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub name: String,
    /// On-disk basename inside the archive directory
    pub filename: String,
    pub hash: String,
    pub hash_algorithm: HashAlgorithm,
    #[serde(default)]
    pub version: Option<String>,
    pub size: u64,
    pub added_date: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Create a record stamped with the current time
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        hash: impl Into<String>,
        hash_algorithm: HashAlgorithm,
        version: Option<String>,
        size: u64,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            hash: hash.into(),
            hash_algorithm,
            version,
            size,
            added_date: Utc::now(),
        }
    }
}

/// On-disk catalog layout: `{ "isos": [ ... ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub isos: Vec<ArchiveRecord>,
}

/// Archive state of one listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingStatus {
    /// Listing display name
    pub name: String,
    /// Filename the listing entry would download to
    pub filename: Option<String>,
    pub in_archive: bool,
    pub update_available: bool,
    /// Matched archive record, if any
    pub archived: Option<ArchiveRecord>,
}
