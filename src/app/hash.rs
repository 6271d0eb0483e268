//! Incremental hashing and on-disk verification
//!
//! This module provides the hash algorithms understood by the download engine,
//! an incremental [`HashComputer`] that digests a byte stream chunk by chunk,
//! and [`HashVerifier`] for re-hashing files that are already on disk.
//!
//! All digests are reported as lowercase hexadecimal strings, which is the form
//! used by checksum manifests, listings and the archive catalog.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;

use crate::constants::files;
use crate::errors::ParseError;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// All algorithms, weakest first
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    /// Lowercase token, as used in file names like `sha256sum.txt`
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Uppercase token, as used in file names like `SHA256SUMS`
    pub fn as_upper_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Length of a digest in hexadecimal characters
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Validate a candidate digest for this algorithm
    ///
    /// Returns the lowercase form when the candidate has the right length and
    /// only hexadecimal characters.
    pub fn normalize_digest(&self, candidate: &str) -> Option<String> {
        let candidate = candidate.trim();
        if candidate.len() == self.hex_len() && candidate.chars().all(|c| c.is_ascii_hexdigit())
        {
            Some(candidate.to_ascii_lowercase())
        } else {
            None
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match token.as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(ParseError::UnknownAlgorithm {
                name: s.to_string(),
            }),
        }
    }
}

enum DigestState {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

/// Running digest over a byte stream
///
/// Bytes are fed in arbitrary chunks with [`update`](Self::update); the
/// result is identical to hashing the concatenated input in one call.
pub struct HashComputer {
    algorithm: HashAlgorithm,
    state: DigestState,
    bytes_hashed: u64,
}

impl HashComputer {
    /// Start a fresh digest
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Md5 => DigestState::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
        };

        Self {
            algorithm,
            state,
            bytes_hashed: 0,
        }
    }

    /// Feed the next chunk of input
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigestState::Md5(ctx) => ctx.consume(data),
            DigestState::Sha1(hasher) => Digest::update(hasher, data),
            DigestState::Sha256(hasher) => Digest::update(hasher, data),
            DigestState::Sha512(hasher) => Digest::update(hasher, data),
        }
        self.bytes_hashed += data.len() as u64;
    }

    /// Number of bytes consumed so far
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Algorithm this computer was created with
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Finish the digest and return it as lowercase hex
    pub fn finalize_hex(self) -> String {
        match self.state {
            DigestState::Md5(ctx) => hex::encode(ctx.compute().0),
            DigestState::Sha1(hasher) => hex::encode(hasher.finalize()),
            DigestState::Sha256(hasher) => hex::encode(hasher.finalize()),
            DigestState::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }

    /// Hash a complete buffer in one call
    pub fn digest_hex(algorithm: HashAlgorithm, data: &[u8]) -> String {
        let mut computer = Self::new(algorithm);
        computer.update(data);
        computer.finalize_hex()
    }
}

impl fmt::Debug for HashComputer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashComputer")
            .field("algorithm", &self.algorithm)
            .field("bytes_hashed", &self.bytes_hashed)
            .finish()
    }
}

/// Result of re-hashing a file against an expected digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// Whether the computed digest matches the expected one
    pub is_valid: bool,
    /// Digest computed from the file contents
    pub hash: String,
    /// Digest the caller expected, lowercased
    pub expected: String,
    /// Algorithm used for both
    pub hash_algorithm: HashAlgorithm,
}

/// Hash verification for files on disk
pub struct HashVerifier;

impl HashVerifier {
    /// Calculate the digest of a file without loading it into memory
    ///
    /// Reading and hashing run on the blocking pool so large images do not
    /// stall the async runtime.
    pub async fn calculate_file_hash(
        path: &Path,
        algorithm: HashAlgorithm,
    ) -> std::io::Result<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = std::fs::File::open(&path)?;
            let mut computer = HashComputer::new(algorithm);
            let mut buffer = vec![0u8; files::HASH_READ_BUFFER];
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                computer.update(&buffer[..read]);
            }
            debug!(
                "Hashed {} bytes of {} with {}",
                computer.bytes_hashed(),
                path.display(),
                algorithm
            );
            Ok(computer.finalize_hex())
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    /// Re-hash a file and compare it against an expected digest
    ///
    /// Comparison is case-insensitive. An I/O failure (missing file,
    /// permissions) is returned as an error rather than an invalid outcome.
    pub async fn verify_file(
        path: &Path,
        expected: &str,
        algorithm: HashAlgorithm,
    ) -> std::io::Result<VerificationOutcome> {
        let hash = Self::calculate_file_hash(path, algorithm).await?;
        let expected = expected.trim().to_ascii_lowercase();
        Ok(VerificationOutcome {
            is_valid: hash == expected,
            hash,
            expected,
            hash_algorithm: algorithm,
        })
    }
}
