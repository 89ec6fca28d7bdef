//! SHA-256 hashing primitives and stat-based fingerprints

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Read buffer size for streaming file hashes (64 KiB)
const HASH_BUF_SIZE: usize = 64 * 1024;

/// A SHA-256 hash (32 bytes)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Sha256Hash([u8; 32]);

impl Sha256Hash {
    /// Create a new Sha256Hash from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a byte slice
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string (64 characters)
    pub fn to_hex(&self) -> String {
        const HEX_CHARS: &[u8] = b"0123456789abcdef";
        let mut hex = String::with_capacity(64);
        for &byte in &self.0 {
            hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
            hex.push(HEX_CHARS[(byte & 0xf) as usize] as char);
        }
        hex
    }

    /// Parse from hex string (64 characters)
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 {
            anyhow::bail!(
                "Invalid hex length: expected 64 characters (SHA-256), got {}",
                hex.len()
            );
        }

        let mut bytes = [0u8; 32];
        for i in 0..32 {
            let high = hex_char_to_nibble(hex.as_bytes()[i * 2])?;
            let low = hex_char_to_nibble(hex.as_bytes()[i * 2 + 1])?;
            bytes[i] = (high << 4) | low;
        }
        Ok(Self(bytes))
    }
}

/// Helper function to convert a hex character to a nibble
fn hex_char_to_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => anyhow::bail!("Invalid hex character: {}", c as char),
    }
}

impl std::fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sha256Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Sha256Hash::from_bytes(bytes)
}

/// The result of streaming a file through the hasher once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest {
    /// Total bytes read
    pub size: u64,
    /// SHA-256 of the content
    pub hash: Sha256Hash,
    /// Number of newline bytes seen (cached for baselines, not load-bearing)
    pub lines: u64,
}

/// Stream a file through SHA-256, collecting size and newline count in one pass
///
/// The file is never loaded into memory as a whole.
pub fn digest_file(path: &Path) -> Result<FileDigest> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open for hashing: {}", path.display()))?;
    let mut reader = BufReader::with_capacity(HASH_BUF_SIZE, file);

    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_BUF_SIZE];
    let mut size = 0u64;
    let mut lines = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }

    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);

    Ok(FileDigest {
        size,
        hash: Sha256Hash::from_bytes(bytes),
        lines,
    })
}

/// Hash a file, returning (size, hash)
pub fn hash_file(path: &Path) -> Result<(u64, Sha256Hash)> {
    let digest = digest_file(path)?;
    Ok((digest.size, digest.hash))
}

/// Cheap stat-based fingerprint of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// File size in bytes
    pub size: u64,
    /// Modification time (Unix milliseconds)
    pub mtime_ms: u64,
}

/// Take a stat fingerprint without reading content
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat: {}", path.display()))?;
    let mtime_ms = system_time_ms(metadata.modified()?);
    Ok(Fingerprint {
        size: metadata.len(),
        mtime_ms,
    })
}

/// Convert a SystemTime to Unix milliseconds (0 for pre-epoch times)
pub fn system_time_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Incremental hasher for building hashes across multiple chunks
pub struct IncrementalHasher {
    inner: Sha256,
}

impl IncrementalHasher {
    /// Create a new incremental hasher
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Update the hash with more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> Sha256Hash {
        let result = self.inner.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Sha256Hash::from_bytes(bytes)
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}
