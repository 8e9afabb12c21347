//! Checksum computation for copies and archives.
//!
//! This module provides:
//! - Checksum algorithms (MD5, SHA-256, BLAKE3) selectable from settings
//! - File-level checksum computation
//! - Source/copy verification for copy-only jobs

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::EngineError;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ChecksumAlgorithm {
    /// MD5 (included for compatibility with older tooling)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(format!("unknown checksum algorithm '{}'", s)),
        }
    }
}

impl TryFrom<String> for ChecksumAlgorithm {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> String;
}

impl ChecksumHasher for md5::Context {
    fn update(&mut self, data: &[u8]) {
        self.consume(data);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("{:x}", (*self).compute())
    }
}

impl ChecksumHasher for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(self, data);
    }

    fn finalize(self: Box<Self>) -> String {
        format!("{:x}", sha2::Digest::finalize(*self))
    }
}

impl ChecksumHasher for blake3::Hasher {
    fn update(&mut self, data: &[u8]) {
        blake3::Hasher::update(self, data);
    }

    fn finalize(self: Box<Self>) -> String {
        blake3::Hasher::finalize(&self).to_hex().to_string()
    }
}

fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(md5::Context::new()),
        ChecksumAlgorithm::Sha256 => Box::new(<sha2::Sha256 as sha2::Digest>::new()),
        ChecksumAlgorithm::Blake3 => Box::new(blake3::Hasher::new()),
    }
}

/// Compute the checksum of a file
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let read_error = |e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; 65536];

    loop {
        let n = file.read(&mut buffer).map_err(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(ChecksumValue::new(algorithm, hasher.finalize()))
}

/// Compare the checksums of a source file and its copy.
pub fn verify_copy(
    source: &Path,
    copy: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<bool, EngineError> {
    let expected = compute_file_checksum(source, algorithm)?;
    let actual = compute_file_checksum(copy, algorithm)?;
    Ok(expected == actual)
}
