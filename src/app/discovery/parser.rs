//! Checksum manifest parsing
//!
//! Publishers ship digests in a handful of text layouts. Each layout has its
//! own small parser; [`parse_checksum_content`] tries them in priority order
//! and returns the first digest found for the requested file:
//!
//! 1. coreutils: `<hash>  <file>` or `<hash> *<file>`
//! 2. colon-delimited: `<file>: <hash>`
//! 3. parenthesized: `<hash> (<file>)` and BSD tags `SHA256 (<file>) = <hash>`
//! 4. a bare digest as the whole document
//! 5. JSON: `hashes[file][alg]`, `data[file]` or `data[alg][file]`
//!
//! File names and algorithm tokens match case-insensitively; digests must
//! have the algorithm's hex length and are returned lowercased.

use serde_json::Value;

use crate::app::hash::HashAlgorithm;

type FormatParser = fn(&str, &str, HashAlgorithm) -> Option<String>;

const FORMATS: [(&str, FormatParser); 5] = [
    ("coreutils", parse_coreutils),
    ("colon", parse_colon_delimited),
    ("parenthesized", parse_parenthesized),
    ("single-hash", parse_single_hash),
    ("json", parse_json),
];

/// Extract the digest for `filename` from a checksum document
pub fn parse_checksum_content(
    content: &str,
    filename: &str,
    algorithm: HashAlgorithm,
) -> Option<String> {
    FORMATS.iter().find_map(|(name, parser)| {
        let hash = parser(content, filename, algorithm)?;
        tracing::trace!("Matched {} checksum format for {}", name, filename);
        Some(hash)
    })
}

/// Compare a name from a manifest with the target file name
///
/// Manifests sometimes list paths (`./iso/file.iso`) or binary-mode markers
/// (`*file.iso`); only the final component is compared.
fn names_match(candidate: &str, filename: &str) -> bool {
    let candidate = candidate.trim().trim_start_matches('*');
    let basename = candidate.rsplit('/').next().unwrap_or(candidate);
    !basename.is_empty() && basename.eq_ignore_ascii_case(filename.trim())
}

fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

fn parse_coreutils(content: &str, filename: &str, algorithm: HashAlgorithm) -> Option<String> {
    content_lines(content).find_map(|line| {
        let hash = line.split_whitespace().next()?;
        let rest = line[hash.len()..].trim_start();
        if rest.is_empty() || !names_match(rest, filename) {
            return None;
        }
        algorithm.normalize_digest(hash)
    })
}

fn parse_colon_delimited(
    content: &str,
    filename: &str,
    algorithm: HashAlgorithm,
) -> Option<String> {
    content_lines(content).find_map(|line| {
        let (name, hash) = line.rsplit_once(':')?;
        if !names_match(name, filename) {
            return None;
        }
        algorithm.normalize_digest(hash)
    })
}

fn parse_parenthesized(
    content: &str,
    filename: &str,
    algorithm: HashAlgorithm,
) -> Option<String> {
    content_lines(content).find_map(|line| {
        // BSD tag style: SHA256 (file.iso) = <hash>
        if let Some((tagged, hash)) = line.split_once(") =") {
            let (tag, name) = tagged.split_once('(')?;
            let tag: String = tag.trim().chars().filter(|c| *c != '-').collect();
            if tag.eq_ignore_ascii_case(algorithm.as_str()) && names_match(name, filename) {
                return algorithm.normalize_digest(hash);
            }
            return None;
        }

        // <hash> (file.iso)
        let inner = line.strip_suffix(')')?;
        let (hash, name) = inner.split_once('(')?;
        if !names_match(name, filename) {
            return None;
        }
        algorithm.normalize_digest(hash)
    })
}

fn parse_single_hash(content: &str, _filename: &str, algorithm: HashAlgorithm) -> Option<String> {
    algorithm.normalize_digest(content.trim())
}

fn parse_json(content: &str, filename: &str, algorithm: HashAlgorithm) -> Option<String> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let document: Value = serde_json::from_str(trimmed).ok()?;
    let alg = algorithm.as_str();

    let by_file_then_alg = get_ignore_case(&document, "hashes")
        .and_then(|hashes| get_file(hashes, filename))
        .and_then(|entry| get_ignore_case(entry, alg));
    let by_file = get_ignore_case(&document, "data").and_then(|data| get_file(data, filename));
    let by_alg_then_file = get_ignore_case(&document, "data")
        .and_then(|data| get_ignore_case(data, alg))
        .and_then(|entry| get_file(entry, filename));

    let found = [by_file_then_alg, by_file, by_alg_then_file]
        .into_iter()
        .flatten()
        .find_map(|value| value.as_str().and_then(|s| algorithm.normalize_digest(s)));
    found
}

fn get_ignore_case<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

fn get_file<'a>(value: &'a Value, filename: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(candidate, _)| names_match(candidate, filename))
        .map(|(_, value)| value)
}
