//! Command-line argument parsing for ISO Fetcher
//!
//! This module defines the CLI structure using clap derive macros: global
//! verbosity and location flags plus one subcommand per archive operation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::hash::HashAlgorithm;

/// ISO Fetcher - Download and archive OS installation images
#[derive(Parser, Debug)]
#[command(
    name = "iso_fetcher",
    version,
    about = "Download OS installation images and keep a verified local archive",
    long_about = "Downloads installation images, discovers their published checksums,
verifies them while streaming, and tracks what is archived locally."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Archive directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download an image into the archive
    Download(DownloadArgs),

    /// Re-hash a file and compare it with an expected digest
    Verify(VerifyArgs),

    /// List archived images
    List(ListArgs),

    /// Delete an archived image and its record
    Delete(DeleteArgs),

    /// Compare a published listing with the archive
    Check(CheckArgs),

    /// Look for a published checksum for a URL
    Discover(DiscoverArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Image URL
    pub url: String,

    /// Expected digest; discovered from the mirror when omitted
    #[arg(long, value_name = "HEX")]
    pub hash: Option<String>,

    /// Digest algorithm (md5, sha1, sha256, sha512)
    #[arg(short, long)]
    pub algorithm: Option<HashAlgorithm>,

    /// Download somewhere other than the archive directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Replace an existing file
    #[arg(short, long)]
    pub force: bool,

    /// Skip checksum discovery
    #[arg(long)]
    pub no_discover: bool,

    /// Template for the first checksum file tried during discovery
    #[arg(long, value_name = "PATTERN")]
    pub hash_pattern: Option<String>,

    /// Exit with an error when the digest does not match
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the verify command
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// File to hash
    pub file: PathBuf,

    /// Expected digest
    pub hash: String,

    /// Digest algorithm (md5, sha1, sha256, sha512)
    #[arg(short, long)]
    pub algorithm: Option<HashAlgorithm>,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Drop records whose files are gone before listing
    #[arg(long)]
    pub reconcile: bool,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the delete command
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// File name inside the archive directory
    pub filename: String,
}

/// Arguments for the check command
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Listing URL; the configured listing when omitted
    pub url: Option<String>,

    /// Only show entries that are missing or outdated
    #[arg(long)]
    pub pending: bool,
}

/// Arguments for the discover command
#[derive(Args, Debug, Clone)]
pub struct DiscoverArgs {
    /// Image URL
    pub url: String,

    /// Digest algorithm (md5, sha1, sha256, sha512)
    #[arg(short, long)]
    pub algorithm: Option<HashAlgorithm>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level based on global arguments
    pub fn log_level(&self) -> tracing::Level {
        if self.global.quiet {
            tracing::Level::ERROR
        } else if self.global.very_verbose {
            tracing::Level::DEBUG
        } else if self.global.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(verbose: bool, quiet: bool) -> GlobalArgs {
        GlobalArgs {
            verbose,
            very_verbose: false,
            quiet,
            config: None,
            archive_dir: None,
        }
    }

    #[test]
    fn test_log_level() {
        let cli_quiet = Cli {
            global: global(false, true),
            command: Commands::List(ListArgs {
                reconcile: false,
                json: false,
            }),
        };

        let cli_verbose = Cli {
            global: global(true, false),
            command: Commands::List(ListArgs {
                reconcile: false,
                json: false,
            }),
        };

        assert_eq!(cli_quiet.log_level(), tracing::Level::ERROR);
        assert_eq!(cli_verbose.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "iso_fetcher",
            "--archive-dir",
            "/srv/isos",
            "download",
            "https://example.org/a.iso",
            "--algorithm",
            "sha1",
            "--no-discover",
        ])
        .unwrap();

        assert_eq!(cli.global.archive_dir, Some(PathBuf::from("/srv/isos")));
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.url, "https://example.org/a.iso");
                assert_eq!(args.algorithm, Some(HashAlgorithm::Sha1));
                assert!(args.no_discover);
                assert!(!args.force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_algorithm() {
        let result = Cli::try_parse_from([
            "iso_fetcher",
            "verify",
            "a.iso",
            "abcd",
            "--algorithm",
            "crc32",
        ]);
        assert!(result.is_err());
    }
}
