//! File discovery over a directory tree with jwalk.
//!
//! [`Walker`] yields one [`WorkItem`] per regular file below the root, with
//! the directory and file name already escaped for the manifest. Directory
//! reads run in parallel inside jwalk; items come out in name order per
//! directory.
//!
//! - Symbolic links are neither followed nor yielded
//! - Directories named in [`WalkerConfig::excluded_dirs`] are pruned before
//!   jwalk reads them
//! - Paths in [`WalkerConfig::excluded_files`] are dropped
//! - Empty and hidden files are yielded like any other
//!
//! # Example
//!
//! ```no_run
//! use treesum::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/srv/archive"), WalkerConfig::default());
//! let items: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("{} files to hash", items.len());
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jwalk::{DirEntry, WalkDir};

use super::{ScanError, WalkerConfig, WorkItem};
use crate::manifest::escape::{encode_component, encode_relative_dir};

type Entry = DirEntry<((), ())>;

/// Lists the files a run has to hash.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Walk `root` with `config`.
    ///
    /// Excluded files are compared against `root.join(..)` paths, so pass
    /// the same (ideally canonical) form for both.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop yielding items once `flag` is raised.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn stopped(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Iterate over the files under the root.
    ///
    /// Unreadable paths come out as [`ScanError`]s and the walk goes on.
    pub fn walk(&self) -> impl Iterator<Item = Result<WorkItem, ScanError>> + '_ {
        let excluded_dirs: Arc<Vec<String>> = Arc::new(self.config.excluded_dirs.clone());

        WalkDir::new(&self.root)
            .follow_links(false)
            .skip_hidden(false)
            .process_read_dir(move |_depth, _dir, _state, children| {
                children.retain(|child| {
                    let Ok(entry) = child else { return true };
                    let excluded = entry.file_type().is_dir()
                        && excluded_dirs
                            .iter()
                            .any(|name| entry.file_name() == OsStr::new(name));
                    if excluded {
                        log::trace!("Pruning {}", entry.path().display());
                    }
                    !excluded
                });
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => CmpOrdering::Less,
                    (Err(_), Ok(_)) => CmpOrdering::Greater,
                    (Err(_), Err(_)) => CmpOrdering::Equal,
                });
            })
            .into_iter()
            .map_while(move |entry| (!self.stopped()).then_some(entry))
            .filter_map(move |entry| match entry {
                Ok(entry) => self.classify(&entry),
                Err(e) => Some(Err(self.read_dir_error(e))),
            })
    }

    /// Turn a directory entry into a work item, or `None` for anything that
    /// is not a regular file we should hash.
    fn classify(&self, entry: &Entry) -> Option<Result<WorkItem, ScanError>> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }
        let path = entry.path();
        if file_type.is_symlink() {
            log::trace!("Not following symlink {}", path.display());
            return None;
        }
        if self.config.excluded_files.contains(&path) {
            log::debug!("Leaving out {}", path.display());
            return None;
        }

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => return Some(Err(stat_error(path, e))),
        };
        // Sockets, fifos and devices.
        if !metadata.is_file() {
            return None;
        }

        let relative = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let filename = path.file_name().map(encode_component).unwrap_or_default();
        Some(Ok(WorkItem::new(
            encode_relative_dir(&relative),
            filename,
            path,
            metadata.len(),
        )))
    }

    fn read_dir_error(&self, error: jwalk::Error) -> ScanError {
        let path = error.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
        log::warn!("Cannot read {}: {}", path.display(), error);
        ScanError::ReadDir {
            path,
            reason: error.to_string(),
        }
    }
}

fn stat_error(path: PathBuf, source: std::io::Error) -> ScanError {
    match source.kind() {
        ErrorKind::NotFound => {
            log::debug!("{} disappeared before it could be read", path.display());
            ScanError::Vanished(path)
        }
        ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path)
        }
        _ => {
            log::warn!("Cannot stat {}: {}", path.display(), source);
            ScanError::Stat { path, source }
        }
    }
}
