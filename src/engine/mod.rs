//! Manifest generation pipeline.
//!
//! # Overview
//!
//! A run moves through these stages:
//! 1. **Cache** - load the previous manifest (update/append only) and check
//!    that it was built with the requested algorithm
//! 2. **Walk** - discover every regular file under the root
//! 3. **Distribute** - split files across workers by total size
//! 4. **Hash** - workers on a dedicated rayon pool hash or reuse digests
//! 5. **Write** - a single writer thread streams records to the manifest
//!
//! Workers, the writer and the progress aggregator communicate only by
//! channels. A shutdown request makes workers stop between files and the
//! writer finalize whatever it has.
//!
//! # Example
//!
//! ```no_run
//! use treesum::engine::{GenerateConfig, ManifestGenerator, RunMode};
//! use std::path::Path;
//!
//! let config = GenerateConfig::new(RunMode::Update);
//! let generator = ManifestGenerator::new(config);
//! let summary = generator.run(Path::new("."), Path::new(".hashes")).unwrap();
//! println!("{} hashed, {} reused", summary.files_hashed, summary.files_reused);
//! ```

pub mod aggregator;
pub mod distributor;
pub mod oracle;
pub mod worker;
pub mod writer;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use crossbeam_channel::bounded;
use rayon::ThreadPoolBuilder;
use serde::Serialize;

use crate::manifest::{temp_path, Cache, Manifest, ManifestError};
use crate::progress::{NoProgress, ProgressCallback};
use crate::scanner::{Algorithm, Hasher, Walker, WalkerConfig, DEFAULT_EXCLUDED_DIRS};

pub use aggregator::{ProgressAggregator, WorkerProgress};
pub use distributor::{distribute, Assignment};
pub use oracle::{FileStat, SkipOracle, DEFAULT_SANITY_EPOCH};
pub use worker::{HashResult, HashWorker, ProgressEvent, RecordOrigin, WorkerReport};
pub use writer::{Finalized, ManifestWriter, WriteMode, WriterPipeline, DEFAULT_WRITE_FREQUENCY};

/// Default bound of the results channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default bytes between byte-progress events within one file (64 MiB).
pub const DEFAULT_BYTE_PROGRESS_INTERVAL: u64 = 64 * 1024 * 1024;

/// Bound of each worker's progress channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// What a run does with an existing manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Ignore any existing manifest and hash everything.
    Generate,
    /// Keep the existing manifest and add records for new or changed files.
    Append,
    /// Rewrite the manifest, reusing digests of unchanged files.
    Update,
}

impl RunMode {
    /// Whether this mode reads the previous manifest as a cache.
    #[must_use]
    pub fn uses_cache(self) -> bool {
        !matches!(self, Self::Generate)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generate => "generate",
            Self::Append => "append",
            Self::Update => "update",
        })
    }
}

/// Asked before an update run replaces a manifest built with another algorithm.
pub trait AlgorithmConfirm: Send + Sync {
    /// Return `true` to proceed with `requested`, discarding reuse of every
    /// cached digest.
    fn confirm_switch(&self, previous: &str, requested: Algorithm) -> bool;
}

impl<F> AlgorithmConfirm for F
where
    F: Fn(&str, Algorithm) -> bool + Send + Sync,
{
    fn confirm_switch(&self, previous: &str, requested: Algorithm) -> bool {
        self(previous, requested)
    }
}

/// Errors that stop a run.
#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    /// The run was interrupted by user (Ctrl+C or shutdown signal).
    /// The manifest has been finalized with the records written so far.
    #[error("Run interrupted by user")]
    Interrupted,

    /// The root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The manifest was built with a different algorithm and the switch was
    /// not confirmed.
    #[error("Manifest uses algorithm '{previous}' but '{requested}' was requested")]
    AlgorithmMismatch {
        /// Algorithm named in the existing manifest
        previous: String,
        /// Algorithm requested for this run
        requested: Algorithm,
    },

    /// Reading or writing the manifest failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A pipeline thread panicked.
    #[error("The {0} thread panicked")]
    ThreadPanicked(&'static str),

    /// The root exists but could not be resolved to a canonical path.
    #[error("Cannot resolve root {path}: {source}")]
    RootUnresolved {
        /// Root as given
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Statistics about a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files found by the walk
    pub files_discovered: usize,
    /// Files read and hashed
    pub files_hashed: usize,
    /// Files whose cached digest was reused
    pub files_reused: usize,
    /// Files that could not be read
    pub files_failed: usize,
    /// Directory entries the walk could not access
    pub scan_errors: usize,
    /// Bytes read from tracked files
    pub bytes_read: u64,
    /// Records written to the manifest
    pub records_written: usize,
    /// Cache entries that matched no file in this run
    pub vanished: usize,
    /// Workers used
    pub workers: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
}

impl RunSummary {
    /// Human-readable bytes read.
    #[must_use]
    pub fn bytes_read_display(&self) -> String {
        ByteSize::b(self.bytes_read).to_string()
    }
}

/// Configuration for a manifest run.
#[derive(Clone)]
pub struct GenerateConfig {
    /// Generate, append or update
    pub mode: RunMode,
    /// Digest algorithm for content and identity keys
    pub algorithm: Algorithm,
    /// Worker count; `None` uses the number of logical CPUs
    pub workers: Option<usize>,
    /// Records between explicit flushes
    pub write_frequency: usize,
    /// Cached mtimes at or before this are never trusted
    pub sanity_epoch: f64,
    /// Bytes between byte-progress events within one file
    pub byte_progress_interval: u64,
    /// Directory names never descended into
    pub excluded_dirs: Vec<String>,
    /// Bound of the results channel
    pub channel_capacity: usize,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Consulted when an update would switch algorithms
    pub confirm: Option<Arc<dyn AlgorithmConfirm>>,
}

impl fmt::Debug for GenerateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateConfig")
            .field("mode", &self.mode)
            .field("algorithm", &self.algorithm)
            .field("workers", &self.workers)
            .field("write_frequency", &self.write_frequency)
            .field("sanity_epoch", &self.sanity_epoch)
            .field("byte_progress_interval", &self.byte_progress_interval)
            .field("excluded_dirs", &self.excluded_dirs)
            .field("channel_capacity", &self.channel_capacity)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field("confirm", &self.confirm.as_ref().map(|_| "<confirm>"))
            .finish()
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self::new(RunMode::Generate)
    }
}

impl GenerateConfig {
    /// Create a configuration with defaults for `mode`.
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            algorithm: Algorithm::default(),
            workers: None,
            write_frequency: DEFAULT_WRITE_FREQUENCY,
            sanity_epoch: DEFAULT_SANITY_EPOCH,
            byte_progress_interval: DEFAULT_BYTE_PROGRESS_INTERVAL,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown_flag: None,
            progress_callback: None,
            confirm: None,
        }
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set an explicit worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    /// Set the number of records between flushes.
    #[must_use]
    pub fn with_write_frequency(mut self, frequency: usize) -> Self {
        self.write_frequency = frequency.max(1);
        self
    }

    /// Set the sanity epoch used by the skip check.
    #[must_use]
    pub fn with_sanity_epoch(mut self, epoch: f64) -> Self {
        self.sanity_epoch = epoch;
        self
    }

    /// Set the byte-progress interval.
    #[must_use]
    pub fn with_byte_progress_interval(mut self, interval: u64) -> Self {
        self.byte_progress_interval = interval.max(1);
        self
    }

    /// Set the excluded directory names.
    #[must_use]
    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }

    /// Set the results channel bound.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Set the algorithm switch confirmation.
    #[must_use]
    pub fn with_confirm(mut self, confirm: Arc<dyn AlgorithmConfirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// Workers to use for `files` files: the configured count, or the
    /// number of logical CPUs, never more than `files` and at least one.
    #[must_use]
    pub fn worker_count(&self, files: usize) -> usize {
        self.workers
            .unwrap_or_else(num_cpus::get)
            .min(files)
            .max(1)
    }
}

/// Runs the cache, walk, hash and write stages for one manifest.
#[derive(Debug)]
pub struct ManifestGenerator {
    config: GenerateConfig,
}

impl ManifestGenerator {
    /// Create a generator with the given configuration.
    #[must_use]
    pub fn new(config: GenerateConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Build or refresh the manifest at `manifest` for the tree at `root`.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::PathNotFound`] / [`GenerateError::NotADirectory`]
    ///   for a bad root
    /// - [`GenerateError::AlgorithmMismatch`] when the existing manifest
    ///   uses another algorithm and the switch is not confirmed
    /// - [`GenerateError::Manifest`] when the manifest cannot be read or written
    /// - [`GenerateError::Interrupted`] after a shutdown request, once the
    ///   manifest has been finalized
    pub fn run(&self, root: &Path, manifest: &Path) -> Result<RunSummary, GenerateError> {
        let start_time = Instant::now();
        let config = &self.config;

        if !root.exists() {
            return Err(GenerateError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(GenerateError::NotADirectory(root.to_path_buf()));
        }
        let root = root.canonicalize().map_err(|source| GenerateError::RootUnresolved {
            path: root.to_path_buf(),
            source,
        })?;

        let shutdown = config
            .shutdown_flag
            .clone()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        if shutdown.load(Ordering::SeqCst) {
            return Err(GenerateError::Interrupted);
        }
        let callback: Arc<dyn ProgressCallback> = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoProgress));

        log::info!(
            "Starting {} of {} into {} ({})",
            config.mode,
            root.display(),
            manifest.display(),
            config.algorithm
        );

        let cache = Arc::new(if config.mode.uses_cache() {
            self.load_cache(manifest)?
        } else {
            Cache::default()
        });

        let write_mode = match config.mode {
            RunMode::Append => WriteMode::Append,
            RunMode::Generate | RunMode::Update => WriteMode::Replace,
        };
        let writer = ManifestWriter::create(
            manifest,
            config.algorithm.name(),
            write_mode,
            config.write_frequency,
        )?
        .publish_empty(config.mode == RunMode::Generate);

        // Walk
        callback.on_phase_start("walking", 0);
        callback.on_message(&format!("Walking {}", root.display()));

        let manifest_abs = absolute_path(manifest);
        let walker_config = WalkerConfig::new(config.excluded_dirs.clone())
            .exclude_file(temp_path(&manifest_abs))
            .exclude_file(manifest_abs);
        let walker = Walker::new(&root, walker_config).with_shutdown_flag(Arc::clone(&shutdown));

        let mut summary = RunSummary::default();
        let mut items = Vec::new();
        for result in walker.walk() {
            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    log::debug!("Scan error: {}", e);
                    summary.scan_errors += 1;
                }
            }
        }
        callback.on_phase_end("walking");

        summary.files_discovered = items.len();
        log::info!(
            "Found {} files ({} total)",
            items.len(),
            ByteSize::b(items.iter().map(|i| i.size).sum())
        );

        // Distribute and hash
        let workers = config.worker_count(items.len());
        summary.workers = workers;
        let assignment = distribute(items, workers);

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("treesum-worker-{i}"))
            .build()?;

        let (result_tx, result_rx) = bounded(config.channel_capacity);
        let pipeline = WriterPipeline::new(
            writer,
            result_rx,
            Arc::clone(&shutdown),
            write_mode == WriteMode::Replace,
        );
        let oracle = SkipOracle::new(config.sanity_epoch);
        let hasher = Hasher::new(config.algorithm).with_shutdown_flag(Arc::clone(&shutdown));

        callback.on_phase_start("hashing", summary.files_discovered);
        let (writer_outcome, worker_states) = std::thread::scope(|scope| {
            let writer_handle = scope.spawn(move || pipeline.run());

            let mut progress_receivers = Vec::with_capacity(workers);
            let mut hash_workers = Vec::with_capacity(workers);
            for (id, batch) in assignment.batches.into_iter().enumerate() {
                let (progress_tx, progress_rx) = bounded(PROGRESS_CHANNEL_CAPACITY);
                progress_receivers.push(progress_rx);
                hash_workers.push(
                    HashWorker::new(
                        id,
                        batch,
                        Arc::clone(&cache),
                        oracle,
                        hasher.clone(),
                        result_tx.clone(),
                        progress_tx,
                        Arc::clone(&shutdown),
                    )
                    .with_byte_progress_interval(config.byte_progress_interval),
                );
            }
            drop(result_tx);

            let aggregator = ProgressAggregator::new(workers, Arc::clone(&callback));
            let aggregator_handle = scope.spawn(move || aggregator.run(progress_receivers));

            pool.scope(|pool_scope| {
                for worker in hash_workers {
                    pool_scope.spawn(move |_| {
                        worker.run();
                    });
                }
            });

            (writer_handle.join(), aggregator_handle.join())
        });
        callback.on_phase_end("hashing");

        let worker_states = worker_states.map_err(|_| GenerateError::ThreadPanicked("progress"))?;
        let writer_report = writer_outcome.map_err(|_| GenerateError::ThreadPanicked("writer"))??;

        let totals = ProgressAggregator::total(&worker_states);
        summary.files_hashed = totals.hashed;
        summary.files_reused = totals.reused;
        summary.files_failed = totals.failed;
        summary.bytes_read = totals.bytes_read;
        summary.records_written = writer_report.records_written;

        let interrupted = shutdown.load(Ordering::SeqCst);
        if config.mode.uses_cache() && !interrupted {
            let vanished = cache.unseen(|key| writer_report.seen_keys.contains(key));
            summary.vanished = vanished.len();
            self.report_vanished(&vanished);
        }
        summary.duration = start_time.elapsed();

        if interrupted {
            log::warn!(
                "Interrupted: {} records written to {}",
                summary.records_written,
                manifest.display()
            );
            return Err(GenerateError::Interrupted);
        }

        log::info!(
            "{} complete: {} hashed, {} reused, {} failed, {} read in {:.2?}",
            config.mode,
            summary.files_hashed,
            summary.files_reused,
            summary.files_failed,
            summary.bytes_read_display(),
            summary.duration
        );
        Ok(summary)
    }

    /// Load the previous manifest as a cache, enforcing the algorithm guard.
    fn load_cache(&self, manifest: &Path) -> Result<Cache, GenerateError> {
        if !manifest.exists() {
            log::info!(
                "No existing manifest at {}, every file will be hashed",
                manifest.display()
            );
            return Ok(Cache::default());
        }

        let requested = self.config.algorithm;
        let loaded = Manifest::load(manifest)?;
        match loaded.matches_algorithm(requested) {
            Some(true) => {}
            None => log::warn!(
                "{} has no algorithm header, assuming it was built with {}",
                manifest.display(),
                requested
            ),
            Some(false) => {
                let previous = loaded.algorithm.clone().unwrap_or_default();
                // An appended manifest can only hold one algorithm.
                let confirmed = self.config.mode == RunMode::Update
                    && self
                        .config
                        .confirm
                        .as_ref()
                        .is_some_and(|c| c.confirm_switch(&previous, requested));
                if !confirmed {
                    return Err(GenerateError::AlgorithmMismatch {
                        previous,
                        requested,
                    });
                }
                log::warn!(
                    "Switching {} from {} to {}, every file will be re-hashed",
                    manifest.display(),
                    previous,
                    requested
                );
                return Ok(Cache::default());
            }
        }

        log::info!(
            "Loaded {} cached records from {}",
            loaded.len(),
            manifest.display()
        );
        Ok(loaded.into_cache())
    }

    fn report_vanished(&self, vanished: &[&crate::manifest::FileRecord]) {
        if vanished.is_empty() {
            return;
        }
        match self.config.mode {
            RunMode::Update => log::info!("{} old cache entries cleaned.", vanished.len()),
            _ => log::info!(
                "{} manifest entries no longer match a file on disk.",
                vanished.len()
            ),
        }
        for record in vanished {
            log::debug!("  {} -> {}", record.identity_key, record.path());
        }
    }
}

/// Absolute form of `path` for comparing against walked paths.
///
/// The manifest may not exist yet, so its parent is canonicalized instead.
fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.txt"), b"bravo").unwrap();
        dir
    }

    #[test]
    fn test_worker_count() {
        let config = GenerateConfig::default();
        assert_eq!(config.worker_count(0), 1);
        assert_eq!(config.worker_count(1), 1);
        assert!(config.worker_count(10_000) >= 1);

        let config = GenerateConfig::default().with_workers(4);
        assert_eq!(config.worker_count(2), 2);
        assert_eq!(config.worker_count(100), 4);
    }

    #[test]
    fn test_generate_writes_manifest() {
        let dir = tree();
        let manifest = dir.path().join(".hashes");
        let generator = ManifestGenerator::new(GenerateConfig::new(RunMode::Generate));

        let summary = generator.run(dir.path(), &manifest).unwrap();

        assert_eq!(summary.files_discovered, 2);
        assert_eq!(summary.files_hashed, 2);
        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.bytes_read, 10);

        let loaded = Manifest::load(&manifest).unwrap();
        assert_eq!(loaded.algorithm.as_deref(), Some("md5"));
        let mut paths: Vec<_> = loaded.records.iter().map(|r| r.path()).collect();
        paths.sort();
        assert_eq!(paths, vec!["./a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_update_reuses_everything_when_unchanged() {
        let dir = tree();
        let manifest = dir.path().join(".hashes");
        // Freshly written files are well past the sanity epoch.
        ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
            .run(dir.path(), &manifest)
            .unwrap();

        let summary = ManifestGenerator::new(GenerateConfig::new(RunMode::Update))
            .run(dir.path(), &manifest)
            .unwrap();
        assert_eq!(summary.files_reused, 2);
        assert_eq!(summary.files_hashed, 0);
        assert_eq!(summary.bytes_read, 0);
        assert_eq!(summary.records_written, 2);
    }

    #[test]
    fn test_update_rejects_algorithm_switch_without_confirm() {
        let dir = tree();
        let manifest = dir.path().join(".hashes");
        ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
            .run(dir.path(), &manifest)
            .unwrap();
        let before = fs::read_to_string(&manifest).unwrap();

        let err = ManifestGenerator::new(
            GenerateConfig::new(RunMode::Update).with_algorithm(Algorithm::Sha256),
        )
        .run(dir.path(), &manifest)
        .unwrap_err();

        assert!(matches!(err, GenerateError::AlgorithmMismatch { .. }));
        assert_eq!(fs::read_to_string(&manifest).unwrap(), before);
        assert!(!temp_path(&manifest).exists());
    }

    #[test]
    fn test_update_switches_algorithm_when_confirmed() {
        let dir = tree();
        let manifest = dir.path().join(".hashes");
        ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
            .run(dir.path(), &manifest)
            .unwrap();

        let confirm: Arc<dyn AlgorithmConfirm> = Arc::new(|_: &str, _: Algorithm| true);
        let summary = ManifestGenerator::new(
            GenerateConfig::new(RunMode::Update)
                .with_algorithm(Algorithm::Sha256)
                .with_confirm(confirm),
        )
        .run(dir.path(), &manifest)
        .unwrap();

        assert_eq!(summary.files_hashed, 2);
        let loaded = Manifest::load(&manifest).unwrap();
        assert_eq!(loaded.parsed_algorithm(), Some(Algorithm::Sha256));
    }

    #[test]
    fn test_append_refuses_algorithm_switch_even_if_confirmed() {
        let dir = tree();
        let manifest = dir.path().join(".hashes");
        ManifestGenerator::new(GenerateConfig::new(RunMode::Generate))
            .run(dir.path(), &manifest)
            .unwrap();

        let confirm: Arc<dyn AlgorithmConfirm> = Arc::new(|_: &str, _: Algorithm| true);
        let err = ManifestGenerator::new(
            GenerateConfig::new(RunMode::Append)
                .with_algorithm(Algorithm::Sha1)
                .with_confirm(confirm),
        )
        .run(dir.path(), &manifest)
        .unwrap_err();
        assert!(matches!(err, GenerateError::AlgorithmMismatch { .. }));
    }

    #[test]
    fn test_missing_root() {
        let generator = ManifestGenerator::new(GenerateConfig::default());
        let err = generator
            .run(Path::new("/nonexistent/root/98765"), Path::new("/tmp/x"))
            .unwrap_err();
        assert!(matches!(err, GenerateError::PathNotFound(_)));
    }

    #[test]
    fn test_root_is_file() {
        let dir = tree();
        let generator = ManifestGenerator::new(GenerateConfig::default());
        let err = generator
            .run(&dir.path().join("a.txt"), &dir.path().join(".hashes"))
            .unwrap_err();
        assert!(matches!(err, GenerateError::NotADirectory(_)));
    }

    #[test]
    fn test_shutdown_before_start() {
        let dir = tree();
        let flag = Arc::new(AtomicBool::new(true));
        let generator =
            ManifestGenerator::new(GenerateConfig::default().with_shutdown_flag(flag));
        let err = generator
            .run(dir.path(), &dir.path().join(".hashes"))
            .unwrap_err();
        assert!(matches!(err, GenerateError::Interrupted));
        assert!(!dir.path().join(".hashes").exists());
    }

    #[test]
    fn test_generate_of_empty_tree_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join(".hashes");
        let summary = ManifestGenerator::new(GenerateConfig::default())
            .run(dir.path(), &manifest)
            .unwrap();
        assert_eq!(summary.records_written, 0);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "# Algorithm: md5\n");
        assert!(!temp_path(&manifest).exists());
    }

    #[test]
    fn test_update_of_empty_tree_leaves_no_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join(".hashes");
        let summary = ManifestGenerator::new(GenerateConfig::new(RunMode::Update))
            .run(dir.path(), &manifest)
            .unwrap();
        assert_eq!(summary.records_written, 0);
        assert!(!manifest.exists());
        assert!(!temp_path(&manifest).exists());
    }

    #[test]
    fn test_absolute_path_for_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not-yet");
        let abs = absolute_path(&missing);
        assert_eq!(abs, dir.path().canonicalize().unwrap().join("not-yet"));
    }

    #[test]
    fn test_run_mode_display() {
        assert_eq!(RunMode::Update.to_string(), "update");
        assert!(!RunMode::Generate.uses_cache());
        assert!(RunMode::Append.uses_cache());
    }
}
