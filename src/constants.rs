//! Application constants for ISO Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("ISO-Fetcher/", env!("CARGO_PKG_VERSION"));

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Timeout for a single checksum probe or listing fetch
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Redirect hops followed before giving up
    pub const MAX_REDIRECTS: usize = 5;

    /// Status codes treated as redirects
    pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

    /// Status codes meaning "HEAD not supported, retry with GET"
    pub const HEAD_REJECTED_STATUSES: [u16; 3] = [403, 405, 501];
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Rate limit for probe and listing requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 10;

    /// Maximum retry attempts for 429/503 responses
    pub const MAX_RETRIES: u32 = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Largest checksum or listing document read into memory (8 MiB)
    pub const MAX_TEXT_DOCUMENT_BYTES: u64 = 8 * 1024 * 1024;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Catalog document name inside the archive directory
    pub const CATALOG_FILE_NAME: &str = "isos.json";

    /// Application directory name under the OS config/data dirs
    pub const APP_DIR_NAME: &str = "iso-fetcher";

    /// Configuration file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// Read buffer for re-hashing files on disk (64 KiB)
    pub const HASH_READ_BUFFER: usize = 64 * 1024;
}

/// Download engine constants
pub mod download {
    use super::Duration;

    /// Overall transfer timeout for large images
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// Buffered progress snapshots per job before older ones are dropped
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

    /// Chunks queued for the hashing thread before the writer waits
    pub const HASH_CHANNEL_CAPACITY: usize = 32;
}

/// Job tracker constants
pub mod jobs {
    use super::Duration;

    /// Downloads running at the same time; further jobs wait for a slot
    pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

    /// Interval at which the CLI polls job status
    pub const POLL_INTERVAL: Duration = Duration::from_millis(250);
}

/// Archive catalog constants
pub mod archive {
    /// Size difference above which a listing counts as a new build (1 MiB)
    pub const UPDATE_SIZE_THRESHOLD: u64 = 1024 * 1024;

    /// Extensions stripped before name normalization
    pub const IMAGE_EXTENSIONS: [&str; 6] = ["iso", "img", "qcow2", "raw", "xz", "gz"];

    /// Architecture tokens removed during name normalization
    pub const ARCH_TOKENS: [&str; 16] = [
        "amd64", "x86_64", "x86-64", "x64", "x86", "i386", "i686", "arm64", "aarch64", "armhf",
        "armv7", "ppc64el", "ppc64le", "s390x", "riscv64", "64bit",
    ];

    /// Edition keywords removed during name normalization
    pub const EDITION_TOKENS: [&str; 14] = [
        "desktop", "server", "netinst", "live", "dvd", "dvd1", "cd", "minimal", "install",
        "installer", "standard", "full", "boot", "netboot",
    ];
}

/// Hash-file discovery constants
pub mod discovery {
    /// Default caller pattern for per-file checksum names
    pub const DEFAULT_HASH_FILE_PATTERN: &str = "{filename}.{hashAlgorithm}";

    /// Common checksum file conventions, tried after the caller pattern
    pub const GENERIC_PATTERNS: [&str; 8] = [
        "{filename}.{alg}",
        "{filename}.{alg}sum",
        "{alg}sums.txt",
        "{alg}sum.txt",
        "{ALG}SUMS",
        "SUMS.{alg}",
        "CHECKSUM.{alg}",
        "{alg}.txt",
    ];

    /// Publisher conventions keyed by a URL substring
    pub const PUBLISHER_PATTERNS: [(&str, &str); 5] = [
        ("ubuntu", "SHA256SUMS"),
        ("debian", "SHA256SUMS"),
        ("linuxmint", "sha256sum.txt"),
        ("freebsd", "CHECKSUM.SHA256"),
        ("archlinux", "sha256sums.txt"),
    ];

    /// Aggregate manifests looked up one directory level above the file
    pub const PARENT_PATTERNS: [&str; 3] = ["SHA256SUMS", "sha256sum.txt", "{ALG}SUMS"];
}

/// Environment variable names
pub mod env {
    /// Overrides the configuration file location
    pub const CONFIG_PATH: &str = "ISO_FETCHER_CONFIG";
}

// Re-export commonly used constants at module level
pub use archive::UPDATE_SIZE_THRESHOLD;
pub use download::DEFAULT_TIMEOUT as DEFAULT_DOWNLOAD_TIMEOUT;
pub use http::{MAX_REDIRECTS, USER_AGENT};
pub use jobs::DEFAULT_MAX_CONCURRENT_JOBS;
pub use limits::DEFAULT_RATE_LIMIT_RPS;
