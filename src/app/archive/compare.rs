//! Version and name comparison for update detection
//!
//! Images are matched across releases by a normalized name that drops the
//! version, architecture and edition tokens, so that
//! `ubuntu-22.04-desktop-amd64.iso` and `ubuntu-22.04.3-desktop-amd64.iso`
//! are recognised as the same image at different versions.

use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;

use crate::app::archive::record::ArchiveRecord;
use crate::app::models::ListingEntry;
use crate::constants::archive;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Two or more dot-separated numeric components, e.g. 22.04 or 12.5.0
        Regex::new(r"\d+(?:\.\d+)+").expect("version pattern is valid")
    })
}

/// Compare dotted numeric versions component by component
///
/// Missing trailing components count as 0 and components compare
/// numerically, so `"1.2" == "1.2.0"` and `"2.0" < "10.0"`. Non-numeric
/// components also count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches(&['v', 'V'][..])
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Accept `version` if it is purely dotted numeric (`12`, `22.04.3`, `v1.2`)
pub fn parse_version(version: &str) -> Option<String> {
    let trimmed = version.trim().trim_start_matches(&['v', 'V'][..]);
    let valid = !trimmed.is_empty()
        && trimmed
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    valid.then(|| trimmed.to_string())
}

/// First dotted numeric version embedded in a name or filename
pub fn extract_version(name: &str) -> Option<String> {
    version_pattern()
        .find(name)
        .map(|found| found.as_str().to_string())
}

/// Reduce a name to the part that identifies the image across releases
///
/// Lowercases, strips image extensions, dotted versions, bare numbers,
/// architecture tokens and edition keywords, and joins what is left with `-`.
pub fn normalize_name(name: &str) -> String {
    let mut name = name.trim().to_lowercase();

    while let Some((stem, extension)) = name.rsplit_once('.') {
        if !archive::IMAGE_EXTENSIONS.contains(&extension) {
            break;
        }
        name = stem.to_string();
    }

    let mut name = version_pattern().replace_all(&name, " ").into_owned();
    // Arch tokens that contain separators must go before tokenizing
    for token in archive::ARCH_TOKENS.iter().filter(|t| t.contains(&['-', '_'][..])) {
        name = name.replace(token, " ");
    }

    let tokens: Vec<&str> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
        .filter(|token| !archive::ARCH_TOKENS.contains(token))
        .filter(|token| !archive::EDITION_TOKENS.contains(token))
        .collect();
    tokens.join("-")
}

/// Whether `entry` is a newer build of the archived `record`
///
/// When both sides carry a version the versions decide. Otherwise a size
/// difference above the threshold counts as an update.
pub fn is_update(record: &ArchiveRecord, entry: &ListingEntry) -> bool {
    let archived_version = record
        .version
        .as_deref()
        .and_then(parse_version)
        .or_else(|| extract_version(&record.filename));
    let listed_version = entry
        .version
        .as_deref()
        .and_then(parse_version)
        .or_else(|| entry.filename().and_then(|filename| extract_version(&filename)));

    if let (Some(listed), Some(archived)) = (&listed_version, &archived_version) {
        return compare_versions(listed, archived) == Ordering::Greater;
    }

    match entry.size {
        Some(listed_size) => listed_size.abs_diff(record.size) > archive::UPDATE_SIZE_THRESHOLD,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::hash::HashAlgorithm;

    fn record(filename: &str, version: Option<&str>, size: u64) -> ArchiveRecord {
        ArchiveRecord::new(
            filename,
            filename,
            "00",
            HashAlgorithm::Sha256,
            version.map(str::to_string),
            size,
        )
    }

    fn entry(url: &str, version: Option<&str>, size: Option<u64>) -> ListingEntry {
        let mut entry = ListingEntry::from_url(url, HashAlgorithm::Sha256);
        entry.version = version.map(str::to_string);
        entry.size = size;
        entry
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("22.04.3", "22.04"), Ordering::Greater);
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_versions("v12.5", "12.4.9"), Ordering::Greater);
    }

    #[test]
    fn test_parse_and_extract_version() {
        assert_eq!(parse_version("22.04.3").as_deref(), Some("22.04.3"));
        assert_eq!(parse_version("12").as_deref(), Some("12"));
        assert_eq!(parse_version("22.04 LTS"), None);
        assert_eq!(parse_version(""), None);

        assert_eq!(
            extract_version("ubuntu-22.04.3-desktop-amd64.iso").as_deref(),
            Some("22.04.3")
        );
        assert_eq!(extract_version("archlinux-x86_64.iso"), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("ubuntu-22.04-desktop-amd64.iso"), "ubuntu");
        assert_eq!(
            normalize_name("ubuntu-22.04-desktop-amd64.iso"),
            normalize_name("ubuntu-22.04.3-desktop-amd64.iso")
        );
        assert_eq!(normalize_name("debian-12.5.0-amd64-netinst.iso"), "debian");
        assert_eq!(
            normalize_name("Fedora-Workstation-Live-x86_64-40.iso"),
            "fedora-workstation"
        );
        assert_eq!(normalize_name("Linux Mint 21.3 Cinnamon"), "linux-mint-cinnamon");
    }

    #[test]
    fn test_update_by_version() {
        let archived = record("ubuntu-22.04-desktop-amd64.iso", Some("22.04"), 100);
        let newer = entry(
            "https://example.org/ubuntu-22.04.3-desktop-amd64.iso",
            Some("22.04.3"),
            None,
        );
        let same = entry(
            "https://example.org/ubuntu-22.04-desktop-amd64.iso",
            Some("22.04.0"),
            Some(100 + 10 * 1024 * 1024),
        );
        assert!(is_update(&archived, &newer));
        // versions decide even when the sizes differ
        assert!(!is_update(&archived, &same));
    }

    #[test]
    fn test_update_version_from_filename() {
        let archived = record("debian-12.4.0-amd64-netinst.iso", None, 100);
        let listed = entry("https://example.org/debian-12.5.0-amd64-netinst.iso", None, None);
        assert!(is_update(&archived, &listed));
    }

    #[test]
    fn test_update_by_size() {
        let archived = record("arch.iso", None, 800 * 1024 * 1024);
        let bigger = entry("https://example.org/arch.iso", None, Some(802 * 1024 * 1024));
        let close = entry(
            "https://example.org/arch.iso",
            None,
            Some(800 * 1024 * 1024 + 512),
        );
        let unknown = entry("https://example.org/arch.iso", None, None);

        assert!(is_update(&archived, &bigger));
        assert!(!is_update(&archived, &close));
        assert!(!is_update(&archived, &unknown));
    }
}
