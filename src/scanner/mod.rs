//! Finding files and digesting them.
//!
//! - [`walker`] lists regular files under a root as [`WorkItem`]s, already
//!   in manifest form, pruning excluded directory names
//! - [`hasher`] streams file contents through the selected [`Algorithm`]
//!
//! # Example
//!
//! ```no_run
//! use treesum::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for item in walker.walk() {
//!     match item {
//!         Ok(item) => println!("{}: {} bytes", item.display_path(), item.size),
//!         Err(e) => eprintln!("skipped: {e}"),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use hasher::{digest_stream, identity_key, Algorithm, Hasher, BLOCK_SIZE};
pub use walker::Walker;

/// Directory names excluded from traversal unless configured otherwise.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[".git"];

/// A regular file discovered under the root, waiting to be hashed.
///
/// `directory` and `filename` are already in manifest form: escaped,
/// relative to the root, `"."` for the root itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Escaped directory relative to the root (`"."` for root-level files)
    pub directory: String,
    /// Escaped file name
    pub filename: String,
    /// Absolute path used to open the file
    pub path: PathBuf,
    /// Size at discovery time, used for load balancing
    pub size: u64,
}

impl WorkItem {
    /// Create a new work item.
    #[must_use]
    pub fn new(
        directory: impl Into<String>,
        filename: impl Into<String>,
        path: PathBuf,
        size: u64,
    ) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            path,
            size,
        }
    }

    /// The `directory/filename` form used in logs and identity keys.
    #[must_use]
    pub fn display_path(&self) -> String {
        format!("{}/{}", self.directory, self.filename)
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Directory names that are never descended into.
    pub excluded_dirs: Vec<String>,

    /// Files that must not appear in the output, compared by absolute path.
    /// Typically the manifest being written and its temporary sibling.
    pub excluded_files: Vec<PathBuf>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            excluded_files: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Create a configuration with the given excluded directory names.
    #[must_use]
    pub fn new(excluded_dirs: Vec<String>) -> Self {
        Self {
            excluded_dirs,
            excluded_files: Vec::new(),
        }
    }

    /// Add a file that must be skipped during the walk.
    #[must_use]
    pub fn exclude_file(mut self, path: PathBuf) -> Self {
        self.excluded_files.push(path);
        self
    }
}

/// A path the walk could not turn into a [`WorkItem`].
///
/// Walk errors are counted and logged; they never stop the run.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The entry exists but may not be stat'ed.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Listed by the directory read but gone before it could be stat'ed.
    #[error("Vanished during walk: {0}")]
    Vanished(PathBuf),

    /// Any other metadata failure.
    #[error("Cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be listed.
    #[error("Cannot read directory {path}: {reason}")]
    ReadDir { path: PathBuf, reason: String },
}

/// Failure to digest one file. The worker skips the file and moves on,
/// except for [`HashError::Interrupted`].
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// Removed after the walk listed it.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// The file may not be opened for reading.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Shutdown was requested mid-read.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// Opening or reading failed for another reason.
    #[error("Read failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
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
