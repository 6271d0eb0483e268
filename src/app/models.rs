//! Data models for published image listings
//!
//! A listing is a JSON document published by a third party that maps display
//! names to download metadata:
//!
//! ```json
//! {
//!   "Ubuntu 22.04 Desktop": {
//!     "url": "https://releases.ubuntu.com/22.04/ubuntu-22.04.3-desktop-amd64.iso",
//!     "hash": "a435f6f3...",
//!     "hashAlgorithm": "sha256",
//!     "version": "22.04.3",
//!     "size": 5037662208
//!   }
//! }
//! ```
//!
//! Entries are rebuilt from scratch on every fetch and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::app::hash::HashAlgorithm;
use crate::errors::{ParseError, ParseResult};

/// One image advertised by a remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// Display name (not guaranteed unique across sources)
    pub name: String,
    /// Source location of the binary
    pub url: String,
    /// Published digest, if the listing carries one
    pub expected_hash: Option<String>,
    /// Algorithm of `expected_hash` and of the digest computed on download
    pub hash_algorithm: HashAlgorithm,
    /// Dotted numeric version, if published
    pub version: Option<String>,
    /// Size in bytes, if published
    pub size: Option<u64>,
}

impl ListingEntry {
    /// Build an entry for a bare URL, naming it after its last path segment
    pub fn from_url(url: &str, hash_algorithm: HashAlgorithm) -> Self {
        let name = Url::parse(url)
            .ok()
            .and_then(|parsed| filename_from_url(&parsed))
            .unwrap_or_else(|| url.to_string());

        Self {
            name,
            url: url.to_string(),
            expected_hash: None,
            hash_algorithm,
            version: None,
            size: None,
        }
    }

    /// Set the expected digest
    pub fn with_expected_hash(mut self, hash: impl Into<String>) -> Self {
        self.expected_hash = Some(hash.into());
        self
    }

    /// Filename the image will be stored under, derived from the URL
    pub fn filename(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|parsed| filename_from_url(&parsed))
    }
}

/// Raw listing row as published
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListingEntry {
    url: Option<String>,
    #[serde(alias = "sha256", alias = "checksum")]
    hash: Option<String>,
    #[serde(alias = "hash_algorithm")]
    hash_algorithm: Option<String>,
    version: Option<Value>,
    size: Option<u64>,
}

/// Parse a listing document into entries sorted by name
///
/// Rows without a `url` are skipped with a warning; an unknown
/// `hashAlgorithm` falls back to `default_algorithm`. The document itself must
/// be a JSON object, otherwise [`ParseError::InvalidListing`] is returned.
pub fn parse_listing(
    content: &str,
    default_algorithm: HashAlgorithm,
) -> ParseResult<Vec<ListingEntry>> {
    let document: Value = serde_json::from_str(content)?;
    let Value::Object(rows) = document else {
        return Err(ParseError::InvalidListing {
            reason: "expected a JSON object mapping names to entries".to_string(),
        });
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (name, row) in rows {
        let raw: RawListingEntry = match serde_json::from_value(row) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed listing entry '{}': {}", name, e);
                continue;
            }
        };

        let Some(url) = raw.url.filter(|url| !url.trim().is_empty()) else {
            warn!("Skipping listing entry '{}' without a url", name);
            continue;
        };

        let hash_algorithm = match raw.hash_algorithm.as_deref() {
            Some(token) => token.parse().unwrap_or_else(|_| {
                debug!(
                    "Unknown hash algorithm '{}' for '{}', using {}",
                    token, name, default_algorithm
                );
                default_algorithm
            }),
            None => default_algorithm,
        };

        let version = match raw.version {
            Some(Value::String(version)) if !version.trim().is_empty() => Some(version),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        };

        entries.push(ListingEntry {
            name,
            url,
            expected_hash: raw
                .hash
                .map(|hash| hash.trim().to_ascii_lowercase())
                .filter(|hash| !hash.is_empty()),
            hash_algorithm,
            version,
            size: raw.size,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Last non-empty path segment of a URL, if it is a plain file name
pub fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return None;
    }
    Some(segment.to_string())
}
