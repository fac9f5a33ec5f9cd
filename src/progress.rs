//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`ProgressCallback`] to draw a discovery spinner and one byte-based
//! bar per hash worker.

use std::sync::Mutex;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::engine::aggregator::WorkerProgress;

/// Progress callback for a manifest run.
///
/// The aggregator calls the worker methods from a single thread, but
/// implementations must still be `Send + Sync` because they are shared
/// through an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (`"walking"`, `"hashing"`)
    /// * `total` - Total number of items, `0` when unknown
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, _phase: &str) {}

    /// Called when a worker announces its batch.
    fn on_worker_start(&self, worker: usize, progress: &WorkerProgress);

    /// Called after a file completes or a large file advances.
    fn on_worker_progress(&self, worker: usize, progress: &WorkerProgress);

    /// Called once when a worker has finished.
    fn on_worker_done(&self, worker: usize, progress: &WorkerProgress);

    /// Called to show a one-off message.
    fn on_message(&self, _message: &str) {}
}

/// Callback that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_worker_start(&self, _worker: usize, _progress: &WorkerProgress) {}
    fn on_worker_progress(&self, _worker: usize, _progress: &WorkerProgress) {}
    fn on_worker_done(&self, _worker: usize, _progress: &WorkerProgress) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    workers: Mutex<Vec<Option<ProgressBar>>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use treesum::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            walking: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            quiet,
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn worker_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:>10} [{bar:30.green/blue}] {bytes}/{total_bytes} {msg} {bytes_per_sec} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_worker_bar<F>(&self, worker: usize, f: F)
    where
        F: FnOnce(&ProgressBar),
    {
        if let Ok(bars) = self.workers.lock() {
            if let Some(Some(pb)) = bars.get(worker) {
                f(pb);
            }
        }
    }
}

fn files_message(progress: &WorkerProgress) -> String {
    format!("{}/{} files", progress.files_done, progress.files_total)
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, _total: usize) {
        if self.quiet || phase != "walking" {
            return;
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::walking_style());
        pb.set_message("Walking directory");
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut walking) = self.walking.lock() {
            *walking = Some(pb);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        match phase {
            "walking" => {
                if let Some(pb) = self.walking.lock().ok().and_then(|mut w| w.take()) {
                    pb.finish_with_message("Walking complete");
                }
            }
            "hashing" => {
                if let Ok(mut bars) = self.workers.lock() {
                    for pb in bars.iter_mut().filter_map(Option::take) {
                        pb.finish_and_clear();
                    }
                }
            }
            _ => {}
        }
    }

    fn on_worker_start(&self, worker: usize, progress: &WorkerProgress) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new(progress.bytes_total));
        pb.set_style(Self::worker_style());
        pb.set_prefix(format!("worker {worker}"));
        pb.set_message(files_message(progress));

        if let Ok(mut bars) = self.workers.lock() {
            if bars.len() <= worker {
                bars.resize(worker + 1, None);
            }
            bars[worker] = Some(pb);
        }
    }

    fn on_worker_progress(&self, worker: usize, progress: &WorkerProgress) {
        if self.quiet {
            return;
        }
        self.with_worker_bar(worker, |pb| {
            pb.set_position(progress.bytes_position());
            pb.set_message(files_message(progress));
        });
    }

    fn on_worker_done(&self, worker: usize, progress: &WorkerProgress) {
        if self.quiet {
            return;
        }
        let report = progress.report;
        self.with_worker_bar(worker, |pb| {
            pb.set_position(progress.bytes_position());
            pb.finish_with_message(format!(
                "{} hashed, {} reused, {} read",
                report.hashed,
                report.reused,
                ByteSize::b(report.bytes_read)
            ));
        });
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.walking.lock().ok().and_then(|w| w.clone()) {
            pb.set_message(message.to_string());
        } else {
            let _ = self.multi.println(message);
        }
    }
}
