//! Streaming file hasher with a selectable digest algorithm.
//!
//! # Overview
//!
//! This module provides:
//! - [`Algorithm`]: the digest recorded in a manifest header
//! - [`digest_stream`]: block-wise hashing of any [`Read`] source
//! - [`Hasher`]: file hashing bound to one algorithm, with cooperative
//!   cancellation between blocks and identity-key derivation
//!
//! # Example
//!
//! ```
//! use treesum::scanner::hasher::{digest_stream, Algorithm};
//!
//! let (digest, bytes) = digest_stream(&b"hello"[..], Algorithm::Md5, |_| {}).unwrap();
//! assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
//! assert_eq!(bytes, 5);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blake2::{Blake2b512, Blake2s256};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use super::HashError;

/// Read size used when streaming file content (1 MiB).
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Digest algorithms a manifest can be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Algorithm {
    /// MD5 (128 bits). Default, matches manifests produced by older releases.
    #[default]
    Md5,
    /// SHA-1 (160 bits)
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-512
    Sha512,
    /// BLAKE2b with 512-bit output
    Blake2b,
    /// BLAKE2s with 256-bit output
    Blake2s,
    /// BLAKE3
    Blake3,
}

impl Algorithm {
    /// Every supported algorithm, in display order.
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha512,
        Algorithm::Blake2b,
        Algorithm::Blake2s,
        Algorithm::Blake3,
    ];

    /// Canonical lowercase name, as written to the manifest header.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake2b => "blake2b",
            Self::Blake2s => "blake2s",
            Self::Blake3 => "blake3",
        }
    }

    /// Length of the hex digest this algorithm produces.
    #[must_use]
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 | Self::Blake2s | Self::Blake3 => 64,
            Self::Sha512 | Self::Blake2b => 128,
        }
    }

    /// Create a fresh incremental digester.
    #[must_use]
    pub fn digester(self) -> Digester {
        match self {
            Self::Md5 => Digester::Md5(Md5::new()),
            Self::Sha1 => Digester::Sha1(Sha1::new()),
            Self::Sha256 => Digester::Sha256(Sha256::new()),
            Self::Sha512 => Digester::Sha512(Sha512::new()),
            Self::Blake2b => Digester::Blake2b(Blake2b512::new()),
            Self::Blake2s => Digester::Blake2s(Blake2s256::new()),
            Self::Blake3 => Digester::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Hex digest of an in-memory byte string.
    #[must_use]
    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        let mut digester = self.digester();
        digester.update(bytes);
        digester.finalize_hex()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown algorithm name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown hash algorithm '{0}' (expected one of: md5, sha1, sha256, sha512, blake2b, blake2s, blake3)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake2b" | "blake2b512" => Ok(Self::Blake2b),
            "blake2s" | "blake2s256" => Ok(Self::Blake2s),
            "blake3" => Ok(Self::Blake3),
            _ => Err(UnknownAlgorithm(s.trim().to_string())),
        }
    }
}

/// Incremental digest state for one of the supported algorithms.
pub enum Digester {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake2b(Blake2b512),
    Blake2s(Blake2s256),
    Blake3(Box<blake3::Hasher>),
}

impl Digester {
    /// Feed a block of bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake2b(h) => h.update(data),
            Self::Blake2s(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the state and return the lowercase hex digest.
    #[must_use]
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
            Self::Blake2b(h) => format!("{:x}", h.finalize()),
            Self::Blake2s(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash a byte stream in [`BLOCK_SIZE`] blocks until EOF.
///
/// `on_block` receives the cumulative number of bytes consumed after
/// every block, which lets callers report progress on very large files.
///
/// # Returns
///
/// The hex digest and the total number of bytes read.
///
/// # Errors
///
/// Propagates any read error other than [`ErrorKind::Interrupted`],
/// which is retried.
pub fn digest_stream<R, F>(
    mut reader: R,
    algorithm: Algorithm,
    mut on_block: F,
) -> std::io::Result<(String, u64)>
where
    R: Read,
    F: FnMut(u64),
{
    let mut digester = algorithm.digester();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digester.update(&buffer[..read]);
        total += read as u64;
        on_block(total);
    }

    Ok((digester.finalize_hex(), total))
}

/// Derive the identity key of a file slot.
///
/// The key digests `path|size|mtime` with the manifest's algorithm. It is
/// only used to find a file's previous cache entry and says nothing about
/// content. `path` is the escaped `directory/filename` form stored in the
/// manifest, so the `|` separators cannot collide with path text.
#[must_use]
pub fn identity_key(algorithm: Algorithm, path: &str, size: u64, mtime: f64) -> String {
    let material = format!("{path}|{size}|{mtime}");
    algorithm.digest_bytes(material.as_bytes())
}

/// File hasher bound to a single algorithm.
///
/// Checks the optional shutdown flag between blocks so a multi-gigabyte
/// file does not delay an interrupt.
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: Algorithm,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a hasher for `algorithm`.
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The algorithm this hasher produces.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Identity key for `path` under this hasher's algorithm.
    #[must_use]
    pub fn identity_key(&self, path: &str, size: u64, mtime: f64) -> String {
        identity_key(self.algorithm, path, size, mtime)
    }

    /// Hash the full content of a file.
    ///
    /// `on_block` receives cumulative bytes read, as in [`digest_stream`].
    ///
    /// # Errors
    ///
    /// - [`HashError::NotFound`] / [`HashError::PermissionDenied`] when the
    ///   file cannot be opened
    /// - [`HashError::Interrupted`] when shutdown is requested mid-file
    /// - [`HashError::Io`] for any other read failure
    pub fn hash_file<F>(&self, path: &Path, mut on_block: F) -> Result<(String, u64), HashError>
    where
        F: FnMut(u64),
    {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        let mut interrupted = false;
        let result = digest_stream(
            CancellableReader {
                inner: file,
                hasher: self,
                interrupted: &mut interrupted,
            },
            self.algorithm,
            &mut on_block,
        );

        if interrupted {
            return Err(HashError::Interrupted(path.to_path_buf()));
        }
        result.map_err(|e| HashError::from_io(path, e))
    }
}

/// Reader adapter that reports EOF once shutdown is requested.
struct CancellableReader<'a, R> {
    inner: R,
    hasher: &'a Hasher,
    interrupted: &'a mut bool,
}

impl<R: Read> Read for CancellableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.hasher.is_shutdown_requested() {
            *self.interrupted = true;
            return Ok(0);
        }
        self.inner.read(buf)
    }
}
