//! Configuration management for ISO Fetcher
//!
//! Settings live in a TOML file; every section and key is optional and falls
//! back to the built-in defaults, so running without a configuration file is
//! the zero-config case. Durations use humantime notation (`30s`, `10m`).
//!
//! ```toml
//! [archive]
//! archive_dir = "/srv/isos"
//!
//! [listing]
//! default_url = "https://example.org/isos.json"
//!
//! [download]
//! hash_algorithm = "sha256"
//! hash_file_pattern = "{filename}.{hashAlgorithm}"
//! timeout = "10m"
//! max_concurrent_jobs = 3
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::archive::ArchiveConfig;
use crate::app::client::ClientConfig;
use crate::app::hash::HashAlgorithm;
use crate::app::jobs::TrackerConfig;
use crate::app::service::ServiceConfig;
use crate::constants::{discovery, download, env, files, http, jobs, limits};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Archive locations
    pub archive: ArchiveConfigToml,
    /// Remote listing settings
    pub listing: ListingConfigToml,
    /// Download and verification settings
    pub download: DownloadConfigToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly archive configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfigToml {
    /// Directory holding downloaded images (None = platform data directory)
    pub archive_dir: Option<PathBuf>,
    /// Catalog document (None = `isos.json` inside the archive directory)
    pub catalog_file: Option<PathBuf>,
}

/// TOML-friendly listing configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfigToml {
    /// Listing fetched when no URL is given on the command line
    pub default_url: Option<String>,
}

/// TOML-friendly download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfigToml {
    /// Algorithm used when a listing entry names none
    pub hash_algorithm: HashAlgorithm,
    /// First checksum file candidate tried during discovery
    pub hash_file_pattern: String,
    /// Overall time budget per transfer
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Downloads running at the same time
    pub max_concurrent_jobs: usize,
    /// Redirect hops followed before failing
    pub max_redirects: usize,
    /// Look up published checksums for entries without one
    pub discover_hashes: bool,
}

impl Default for DownloadConfigToml {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            hash_file_pattern: discovery::DEFAULT_HASH_FILE_PATTERN.to_string(),
            timeout: download::DEFAULT_TIMEOUT,
            max_concurrent_jobs: jobs::DEFAULT_MAX_CONCURRENT_JOBS,
            max_redirects: http::MAX_REDIRECTS,
            discover_hashes: true,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for redirect probes, checksum files and listings
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Rate limit for probes and listings (requests per second)
    pub rate_limit_rps: u32,
    /// User agent override
    pub user_agent: Option<String>,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            connect_timeout: http::CONNECT_TIMEOUT,
            probe_timeout: http::PROBE_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            user_agent: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `$ISO_FETCHER_CONFIG` and
    /// then the user configuration directory are tried; finding nothing
    /// yields the defaults.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let from_env = std::env::var_os(env::CONFIG_PATH).map(PathBuf::from);
        let search_paths = from_env.into_iter().chain(Self::default_config_path());

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }
        None
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(files::APP_DIR_NAME).join(files::CONFIG_FILE_NAME))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        let config: AppConfig = toml::from_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Reject values that would stall or disable the engine
    pub fn validate(&self) -> ConfigResult<()> {
        if self.download.max_concurrent_jobs == 0 {
            return Err(invalid(
                "download.max_concurrent_jobs",
                "0",
                "At least one download must be allowed to run",
            ));
        }
        if self.download.max_redirects == 0 {
            return Err(invalid(
                "download.max_redirects",
                "0",
                "Mirrors redirect; allow at least one hop",
            ));
        }
        if self.download.timeout.is_zero() {
            return Err(invalid("download.timeout", "0s", "Timeout must be positive"));
        }
        if self.client.rate_limit_rps == 0 {
            return Err(invalid(
                "client.rate_limit_rps",
                "0",
                "Rate limit must be at least 1 request per second",
            ));
        }
        if !self.download.hash_file_pattern.contains("{filename}") {
            return Err(invalid(
                "download.hash_file_pattern",
                &self.download.hash_file_pattern,
                "Pattern must contain {filename}",
            ));
        }
        Ok(())
    }

    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> ServiceConfig {
        let mut archive = match &self.archive.archive_dir {
            Some(dir) => ArchiveConfig::new(dir),
            None => ArchiveConfig::default(),
        };
        if let Some(catalog_file) = &self.archive.catalog_file {
            archive = archive.with_catalog_file(catalog_file);
        }

        let client = ClientConfig {
            user_agent: self
                .client
                .user_agent
                .clone()
                .unwrap_or_else(|| http::USER_AGENT.to_string()),
            connect_timeout: self.client.connect_timeout,
            probe_timeout: self.client.probe_timeout,
            download_timeout: self.download.timeout,
            max_redirects: self.download.max_redirects,
            rate_limit_rps: self.client.rate_limit_rps,
            ..ClientConfig::default()
        };

        let tracker = TrackerConfig {
            max_concurrent_jobs: self.download.max_concurrent_jobs,
            timeout: self.download.timeout,
            discover_hashes: self.download.discover_hashes,
            default_output_dir: archive.archive_dir.clone(),
        };

        ServiceConfig {
            client,
            archive,
            tracker,
            default_algorithm: self.download.hash_algorithm,
            hash_file_pattern: self.download.hash_file_pattern.clone(),
            listing_url: self.listing.default_url.clone(),
        }
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
