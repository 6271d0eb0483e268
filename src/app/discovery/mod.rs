//! Hash-file discovery
//!
//! Listings frequently omit per-file checksums. The digest usually lives in a
//! sibling text file whose name depends on the publisher, so discovery walks an
//! ordered list of candidate checksum URLs and stops at the first one that both
//! downloads and contains a digest for the target file.
//!
//! Candidates come from a fixed sequence of pure generator functions:
//!
//! 1. the caller's pattern (e.g. `{filename}.{hashAlgorithm}`)
//! 2. generic conventions (`{filename}.{alg}`, `{ALG}SUMS`, ...)
//! 3. publisher conventions keyed by a URL substring
//!
//! The list is deduplicated in order and evaluated lazily. When nothing in the
//! file's own directory matches, aggregate manifests one directory level up
//! are tried. Every probe failure is logged and skipped; "not found" is a
//! normal outcome that means "skip verification".

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::client::http::HttpHandler;
use crate::app::client::redirect::RedirectResolver;
use crate::app::hash::HashAlgorithm;
use crate::app::models::filename_from_url;
use crate::constants::{discovery, limits};

pub mod parser;

pub use parser::parse_checksum_content;

/// A digest found in a remote checksum file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredHash {
    /// Lowercase hex digest
    pub hash: String,
    /// URL of the checksum file the digest was read from
    pub source_url: String,
    /// Template that produced `source_url`
    pub pattern: String,
}

/// One checksum URL to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: Url,
    pub pattern: String,
}

/// Inputs shared by the candidate generators
#[derive(Debug, Clone)]
pub struct ProbeContext<'a> {
    pub target: &'a Url,
    pub filename: &'a str,
    pub algorithm: HashAlgorithm,
    pub pattern: &'a str,
}

type Generator = fn(&ProbeContext<'_>) -> Vec<String>;

/// Same-directory generators, in priority order
static GENERATORS: [Generator; 3] = [caller_pattern, generic_patterns, publisher_patterns];

fn caller_pattern(ctx: &ProbeContext<'_>) -> Vec<String> {
    vec![ctx.pattern.to_string()]
}

fn generic_patterns(_ctx: &ProbeContext<'_>) -> Vec<String> {
    discovery::GENERIC_PATTERNS
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}

fn publisher_patterns(ctx: &ProbeContext<'_>) -> Vec<String> {
    let url = ctx.target.as_str().to_ascii_lowercase();
    discovery::PUBLISHER_PATTERNS
        .iter()
        .filter(|(marker, _)| url.contains(marker))
        .map(|(_, pattern)| pattern.to_string())
        .collect()
}

/// Substitute `{filename}`, `{hashAlgorithm}`, `{alg}` and `{ALG}`
pub fn expand_pattern(pattern: &str, filename: &str, algorithm: HashAlgorithm) -> String {
    pattern
        .replace("{filename}", filename)
        .replace("{hashAlgorithm}", algorithm.as_str())
        .replace("{alg}", algorithm.as_str())
        .replace("{ALG}", algorithm.as_upper_str())
}

/// Directory URL containing `url`, with query and fragment dropped
fn directory_of(url: &Url) -> Option<Url> {
    url.join("./").ok()
}

fn parent_of(directory: &Url) -> Option<Url> {
    let parent = directory.join("../").ok()?;
    (parent != *directory).then_some(parent)
}

/// Ordered, deduplicated same-directory candidates for `ctx`
///
/// Generators run only as the iterator is advanced.
pub fn candidates<'a>(ctx: &'a ProbeContext<'a>) -> impl Iterator<Item = Candidate> + 'a {
    let directory = directory_of(ctx.target);
    let mut seen = HashSet::new();

    GENERATORS
        .iter()
        .flat_map(move |generator| generator(ctx))
        .filter_map(move |pattern| {
            let name = expand_pattern(&pattern, ctx.filename, ctx.algorithm);
            let url = directory.as_ref()?.join(&name).ok()?;
            Some(Candidate { url, pattern })
        })
        .filter(move |candidate| seen.insert(candidate.url.clone()))
}

/// Aggregate manifests one directory above the target
pub fn parent_candidates(ctx: &ProbeContext<'_>) -> Vec<Candidate> {
    let Some(parent) = directory_of(ctx.target).and_then(|dir| parent_of(&dir)) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    discovery::PARENT_PATTERNS
        .iter()
        .filter_map(|pattern| {
            let name = expand_pattern(pattern, ctx.filename, ctx.algorithm);
            let url = parent.join(&name).ok()?;
            Some(Candidate {
                url,
                pattern: pattern.to_string(),
            })
        })
        .filter(|candidate| seen.insert(candidate.url.clone()))
        .collect()
}

/// Probes checksum files next to a download
#[derive(Debug, Clone)]
pub struct HashDiscovery {
    http: Arc<HttpHandler>,
    resolver: RedirectResolver,
    pattern: String,
}

impl HashDiscovery {
    /// Create a discovery service using `pattern` as the caller template
    pub fn new(
        http: Arc<HttpHandler>,
        resolver: RedirectResolver,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            http,
            resolver,
            pattern: pattern.into(),
        }
    }

    /// Configured caller template
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Discover a digest using the configured pattern
    pub async fn discover_hash(
        &self,
        target_url: &str,
        algorithm: HashAlgorithm,
    ) -> Option<DiscoveredHash> {
        self.discover_with_pattern(target_url, algorithm, &self.pattern)
            .await
    }

    /// Discover a digest for `target_url` trying `pattern` first
    ///
    /// Returns `None` when no candidate yields a digest for the file,
    /// including when the URL itself is unusable.
    pub async fn discover_with_pattern(
        &self,
        target_url: &str,
        algorithm: HashAlgorithm,
        pattern: &str,
    ) -> Option<DiscoveredHash> {
        let target = match Url::parse(target_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Skipping hash discovery for invalid URL {}: {}", target_url, e);
                return None;
            }
        };
        // Redirectors such as `/get/latest` publish checksums beside the real file
        let resolved = match self.resolver.resolve(&target).await {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not resolve {} before discovery: {}", target, e);
                target.clone()
            }
        };

        if let Some(found) = self.search(&resolved, algorithm, pattern).await {
            return Some(found);
        }
        if resolved != target {
            debug!("Trying checksums beside the unresolved URL {}", target);
            if let Some(found) = self.search(&target, algorithm, pattern).await {
                return Some(found);
            }
        }

        debug!("No {} checksum found for {}", algorithm, target);
        None
    }

    /// Probe the directory of `target` and then its parent
    async fn search(
        &self,
        target: &Url,
        algorithm: HashAlgorithm,
        pattern: &str,
    ) -> Option<DiscoveredHash> {
        let filename = filename_from_url(target)?;
        let ctx = ProbeContext {
            target,
            filename: &filename,
            algorithm,
            pattern,
        };

        for candidate in candidates(&ctx) {
            if let Some(found) = self.probe(&candidate, &filename, algorithm).await {
                return Some(found);
            }
        }

        debug!("No checksum beside {}, trying parent directory", target);
        for candidate in parent_candidates(&ctx) {
            if let Some(found) = self.probe(&candidate, &filename, algorithm).await {
                return Some(found);
            }
        }

        None
    }

    async fn probe(
        &self,
        candidate: &Candidate,
        filename: &str,
        algorithm: HashAlgorithm,
    ) -> Option<DiscoveredHash> {
        let resolved = match self.resolver.resolve(&candidate.url).await {
            Ok(url) => url,
            Err(e) => {
                debug!("Checksum candidate {} unreachable: {}", candidate.url, e);
                return None;
            }
        };

        let content = match self
            .http
            .get_text(&resolved, limits::MAX_TEXT_DOCUMENT_BYTES)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                debug!("Checksum candidate {} failed: {}", resolved, e);
                return None;
            }
        };

        let hash = parse_checksum_content(&content, filename, algorithm)?;
        info!(
            "Found {} checksum for {} in {} (pattern {})",
            algorithm, filename, resolved, candidate.pattern
        );
        Some(DiscoveredHash {
            hash,
            source_url: resolved.to_string(),
            pattern: candidate.pattern.clone(),
        })
    }
}
