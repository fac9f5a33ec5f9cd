//! Hash workers.
//!
//! Each worker owns a batch of [`WorkItem`]s and shares nothing mutable
//! with its siblings. Results go to the writer over a bounded channel and
//! progress goes to the aggregator over the worker's own channel.
//!
//! Per item the worker:
//! 1. skips symbolic links
//! 2. stats the file (size, mtime, inode)
//! 3. reuses the cached digest when the [`SkipOracle`] allows it
//! 4. otherwise streams the file through the [`Hasher`]
//!
//! A file that fails to stat or read is logged and counted, never fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crossbeam_channel::Sender;

use super::oracle::{FileStat, SkipOracle};
use crate::manifest::{Cache, FileRecord, RecordFormat};
use crate::scanner::{HashError, Hasher, WorkItem};

/// Where a result's digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOrigin {
    /// Content was read and hashed in this run.
    Hashed,
    /// Digest was copied from the previous manifest.
    Cached,
}

/// A record produced by a worker, on its way to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct HashResult {
    /// Worker that produced the record
    pub worker: usize,
    /// The record to write
    pub record: FileRecord,
    /// Whether the digest was computed or reused
    pub origin: RecordOrigin,
}

/// Per-worker counters, reported once when the worker finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Files read and hashed
    pub hashed: usize,
    /// Files whose cached digest was reused
    pub reused: usize,
    /// Files that could not be stat'ed or read
    pub failed: usize,
    /// Bytes read from tracked files
    pub bytes_read: u64,
    /// Whether the worker stopped before finishing its batch
    pub interrupted: bool,
}

impl WorkerReport {
    /// Add another report's counters to this one.
    pub fn merge(&mut self, other: &WorkerReport) {
        self.hashed += other.hashed;
        self.reused += other.reused;
        self.failed += other.failed;
        self.bytes_read += other.bytes_read;
        self.interrupted |= other.interrupted;
    }
}

/// Progress messages sent from a worker to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The worker is starting on its batch.
    Started {
        /// Worker index
        worker: usize,
        /// Files in the batch
        files: usize,
        /// Bytes in the batch
        bytes: u64,
    },
    /// A file finished, whether hashed, reused or failed.
    Advanced {
        /// Worker index
        worker: usize,
        /// Files completed by this event
        files: usize,
        /// Bytes accounted for by this event
        bytes: u64,
    },
    /// Cumulative bytes hashed within the current large file. May be dropped.
    ByteProgress {
        /// Worker index
        worker: usize,
        /// Bytes read so far in the current file
        bytes: u64,
    },
    /// The worker has finished and will send nothing more.
    Done {
        /// Worker index
        worker: usize,
        /// Final counters
        report: WorkerReport,
    },
}

impl ProgressEvent {
    /// Index of the worker that sent the event.
    #[must_use]
    pub fn worker(&self) -> usize {
        match self {
            Self::Started { worker, .. }
            | Self::Advanced { worker, .. }
            | Self::ByteProgress { worker, .. }
            | Self::Done { worker, .. } => *worker,
        }
    }
}

/// Collect size, mtime and inode for a path without following symlinks.
///
/// Returns `Ok(None)` for symlinks and anything else that is not a
/// regular file.
///
/// # Errors
///
/// Propagates the stat failure.
pub fn stat_file(path: &std::path::Path) -> std::io::Result<Option<FileStat>> {
    let metadata = std::fs::symlink_metadata(path)?;
    if !metadata.file_type().is_file() {
        return Ok(None);
    }
    let mtime = metadata
        .modified()
        .ok()
        .map(|t| match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        })
        .unwrap_or(0.0);

    #[cfg(unix)]
    let inode = {
        use std::os::unix::fs::MetadataExt;
        metadata.ino()
    };
    #[cfg(not(unix))]
    let inode = 0;

    Ok(Some(FileStat {
        size: metadata.len(),
        mtime,
        inode,
    }))
}

/// One hash worker and everything it needs.
pub struct HashWorker {
    id: usize,
    items: Vec<WorkItem>,
    cache: Arc<Cache>,
    oracle: SkipOracle,
    hasher: Hasher,
    results: Sender<HashResult>,
    progress: Sender<ProgressEvent>,
    byte_progress_interval: u64,
    shutdown_flag: Arc<AtomicBool>,
}

impl std::fmt::Debug for HashWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashWorker")
            .field("id", &self.id)
            .field("items", &self.items.len())
            .field("algorithm", &self.hasher.algorithm())
            .finish_non_exhaustive()
    }
}

/// Outcome of processing a single item.
enum Step {
    Continue,
    Stop,
}

impl HashWorker {
    /// Create a worker for one batch.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: usize,
        items: Vec<WorkItem>,
        cache: Arc<Cache>,
        oracle: SkipOracle,
        hasher: Hasher,
        results: Sender<HashResult>,
        progress: Sender<ProgressEvent>,
        shutdown_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            items,
            cache,
            oracle,
            hasher,
            results,
            progress,
            byte_progress_interval: 64 * 1024 * 1024,
            shutdown_flag,
        }
    }

    /// Set how many bytes of a single file pass between byte-progress events.
    #[must_use]
    pub fn with_byte_progress_interval(mut self, interval: u64) -> Self {
        self.byte_progress_interval = interval.max(1);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Process the whole batch, then send [`ProgressEvent::Done`].
    ///
    /// Stops early on shutdown or when the writer is gone.
    pub fn run(mut self) -> WorkerReport {
        let items = std::mem::take(&mut self.items);
        let mut report = WorkerReport::default();

        let _ = self.progress.send(ProgressEvent::Started {
            worker: self.id,
            files: items.len(),
            bytes: items.iter().map(|i| i.size).sum(),
        });
        log::debug!("Worker {} starting with {} files", self.id, items.len());

        for item in &items {
            if self.is_shutdown_requested() {
                log::debug!("Worker {}: Shutdown requested, stopping", self.id);
                report.interrupted = true;
                break;
            }
            match self.process(item, &mut report) {
                Step::Continue => {}
                Step::Stop => {
                    report.interrupted = true;
                    break;
                }
            }
            let _ = self.progress.send(ProgressEvent::Advanced {
                worker: self.id,
                files: 1,
                bytes: item.size,
            });
        }

        log::debug!(
            "Worker {} finished: {} hashed, {} reused, {} failed",
            self.id,
            report.hashed,
            report.reused,
            report.failed
        );
        let _ = self.progress.send(ProgressEvent::Done {
            worker: self.id,
            report,
        });
        report
    }

    fn process(&self, item: &WorkItem, report: &mut WorkerReport) -> Step {
        let stat = match stat_file(&item.path) {
            Ok(Some(stat)) => stat,
            Ok(None) => {
                log::trace!("Skipping non-regular file: {}", item.path.display());
                return Step::Continue;
            }
            Err(e) => {
                log::warn!("Cannot stat {}: {}", item.path.display(), e);
                report.failed += 1;
                return Step::Continue;
            }
        };

        let path_text = item.display_path();
        let identity_key = self.hasher.identity_key(&path_text, stat.size, stat.mtime);
        let reusable = self
            .cache
            .get(&identity_key)
            .filter(|cached| self.oracle.can_skip(&stat, Some(cached)));

        let (digest, origin) = if let Some(cached) = reusable {
            log::trace!("Reusing cached digest for {}", path_text);
            report.reused += 1;
            (cached.digest.clone(), RecordOrigin::Cached)
        } else {
            match self.hash(item, report) {
                Ok(digest) => {
                    report.hashed += 1;
                    (digest, RecordOrigin::Hashed)
                }
                Err(HashError::Interrupted(_)) => return Step::Stop,
                Err(e) => {
                    log::warn!("Failed to hash {}: {}", path_text, e);
                    report.failed += 1;
                    return Step::Continue;
                }
            }
        };

        let result = HashResult {
            worker: self.id,
            record: FileRecord {
                identity_key,
                digest,
                directory: item.directory.clone(),
                filename: item.filename.clone(),
                size: stat.size,
                inode: stat.inode,
                mtime: stat.mtime,
                format: RecordFormat::Current,
            },
            origin,
        };
        if self.results.send(result).is_err() {
            log::debug!("Worker {}: writer has stopped, exiting", self.id);
            return Step::Stop;
        }
        Step::Continue
    }

    fn hash(&self, item: &WorkItem, report: &mut WorkerReport) -> Result<String, HashError> {
        let interval = self.byte_progress_interval;
        let mut next_report = interval;
        let mut consumed = 0u64;

        let outcome = self.hasher.hash_file(&item.path, |total| {
            consumed = total;
            if total >= next_report {
                next_report = total + interval;
                // Dropped when the aggregator lags behind.
                let _ = self.progress.try_send(ProgressEvent::ByteProgress {
                    worker: self.id,
                    bytes: total,
                });
            }
        });
        report.bytes_read += consumed;
        outcome.map(|(digest, _)| digest)
    }
}
