//! Manifest files: loading, the identity-key cache, and the line format.
//!
//! # Architecture
//!
//! - [`record`]: [`FileRecord`] and the line codec
//! - [`escape`]: reversible escaping of path components
//!
//! A manifest may start with a `# Algorithm: <name>` header. Files without
//! one were written by older releases and load with an unknown algorithm.

pub mod escape;
pub mod record;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

pub use record::{decode_line, encode_header, DecodeError, FileRecord, Line, RecordFormat};

use crate::scanner::Algorithm;

/// Default manifest file name, created in the current directory.
pub const DEFAULT_MANIFEST_NAME: &str = ".hashes";

/// Suffix of the temporary file written next to the manifest.
pub const TEMP_SUFFIX: &str = ".new";

/// Errors raised while reading or writing manifest files.
#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    /// The manifest does not exist.
    #[error("Manifest not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied opening the manifest.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Any other I/O failure on the manifest or its temporary file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// Classify an I/O error on `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Path of the temporary file used while a manifest is rewritten.
#[must_use]
pub fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// A fully loaded manifest.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Where the manifest was read from
    pub path: PathBuf,
    /// Algorithm named by the header, if any
    pub algorithm: Option<String>,
    /// Records in file order
    pub records: Vec<FileRecord>,
    /// Lines that were neither blank, header, nor a valid record
    pub skipped_lines: usize,
}

impl Manifest {
    /// Load a manifest, skipping malformed lines.
    ///
    /// Lines are read as bytes and converted lossily so a stray non-UTF-8
    /// line written by another tool cannot abort the load.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be opened or read.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|e| ManifestError::from_io(path, e))?;
        let mut manifest = Self::from_reader(BufReader::new(file))
            .map_err(|e| ManifestError::from_io(path, e))?;
        manifest.path = path.to_path_buf();

        log::debug!(
            "Loaded {} records from {} (algorithm: {}, skipped lines: {})",
            manifest.records.len(),
            path.display(),
            manifest.algorithm.as_deref().unwrap_or("unknown"),
            manifest.skipped_lines
        );
        Ok(manifest)
    }

    /// Parse a manifest from any buffered reader.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn from_reader<R: BufRead>(mut reader: R) -> std::io::Result<Self> {
        let mut manifest = Self::default();
        let mut buffer = Vec::new();
        let mut line_no = 0usize;

        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            line_no += 1;
            let text = String::from_utf8_lossy(&buffer);

            match decode_line(&text) {
                Ok(Line::Header(name)) if line_no == 1 => manifest.algorithm = Some(name),
                Ok(Line::Header(_)) => manifest.skipped_lines += 1,
                Ok(Line::Record(record)) => manifest.records.push(record),
                Ok(Line::Blank) => {}
                Err(e) => {
                    log::debug!("Skipping manifest line {}: {}", line_no, e);
                    manifest.skipped_lines += 1;
                }
            }
        }

        Ok(manifest)
    }

    /// Parse the header's algorithm name, if present and recognised.
    #[must_use]
    pub fn parsed_algorithm(&self) -> Option<Algorithm> {
        self.algorithm.as_deref().and_then(|name| name.parse().ok())
    }

    /// Whether this manifest was built with `algorithm`.
    ///
    /// Returns `None` for headerless manifests, where the answer is unknown.
    #[must_use]
    pub fn matches_algorithm(&self, algorithm: Algorithm) -> Option<bool> {
        self.algorithm
            .as_ref()
            .map(|_| self.parsed_algorithm() == Some(algorithm))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the identity-key cache from this manifest.
    #[must_use]
    pub fn into_cache(self) -> Cache {
        Cache::from_records(self.records)
    }
}

/// Read-only lookup from identity key to the last record written for it.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    entries: HashMap<String, FileRecord>,
}

impl Cache {
    /// Build a cache; later records replace earlier ones with the same key.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut entries = HashMap::new();
        for record in records {
            entries.insert(record.identity_key.clone(), record);
        }
        Self { entries }
    }

    /// Look up a record by identity key.
    #[must_use]
    pub fn get(&self, identity_key: &str) -> Option<&FileRecord> {
        self.entries.get(identity_key)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records whose keys are not in `seen`, sorted by path.
    #[must_use]
    pub fn unseen<'a, F>(&'a self, mut seen: F) -> Vec<&'a FileRecord>
    where
        F: FnMut(&str) -> bool,
    {
        let mut out: Vec<&FileRecord> = self
            .entries
            .iter()
            .filter(|(key, _)| !seen(key))
            .map(|(_, record)| record)
            .collect();
        out.sort_by(|a, b| (&a.directory, &a.filename).cmp(&(&b.directory, &b.filename)));
        out
    }
}
