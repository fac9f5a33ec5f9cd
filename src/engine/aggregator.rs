//! Collects progress from every worker into one view.
//!
//! Each worker has its own channel. The aggregator waits on all of them
//! with [`crossbeam_channel::Select`], removes a channel once its worker
//! hangs up, and returns when none are left. Workers may finish in any
//! order.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Select};

use super::worker::{ProgressEvent, WorkerReport};
use crate::progress::ProgressCallback;

/// Latest known state of one worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerProgress {
    /// Files assigned to the worker
    pub files_total: usize,
    /// Files completed
    pub files_done: usize,
    /// Bytes assigned to the worker
    pub bytes_total: u64,
    /// Bytes of completed files
    pub bytes_done: u64,
    /// Bytes read so far of the file in progress
    pub current_file_bytes: u64,
    /// Whether the worker has sent its final report
    pub finished: bool,
    /// Final counters, valid once `finished` is set
    pub report: WorkerReport,
}

impl WorkerProgress {
    /// Byte position for display, never past the batch total.
    #[must_use]
    pub fn bytes_position(&self) -> u64 {
        let position = self.bytes_done + self.current_file_bytes;
        if self.bytes_total > 0 {
            position.min(self.bytes_total)
        } else {
            position
        }
    }
}

/// Multiplexes worker progress channels and forwards updates to a callback.
pub struct ProgressAggregator {
    callback: Arc<dyn ProgressCallback>,
    workers: Vec<WorkerProgress>,
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl ProgressAggregator {
    /// Create an aggregator for `workers` workers.
    #[must_use]
    pub fn new(workers: usize, callback: Arc<dyn ProgressCallback>) -> Self {
        Self {
            callback,
            workers: vec![WorkerProgress::default(); workers],
        }
    }

    /// Current view of all workers.
    #[must_use]
    pub fn workers(&self) -> &[WorkerProgress] {
        &self.workers
    }

    /// Fold one event into the view and notify the callback.
    pub fn apply(&mut self, event: ProgressEvent) {
        let index = event.worker();
        let Some(state) = self.workers.get_mut(index) else {
            log::debug!("Progress event for unknown worker {}", index);
            return;
        };
        if state.finished {
            return;
        }

        match event {
            ProgressEvent::Started { files, bytes, .. } => {
                state.files_total = files;
                state.bytes_total = bytes;
                self.callback.on_worker_start(index, state);
            }
            ProgressEvent::Advanced { files, bytes, .. } => {
                state.files_done += files;
                state.bytes_done += bytes;
                state.current_file_bytes = 0;
                self.callback.on_worker_progress(index, state);
            }
            ProgressEvent::ByteProgress { bytes, .. } => {
                state.current_file_bytes = bytes;
                self.callback.on_worker_progress(index, state);
            }
            ProgressEvent::Done { report, .. } => {
                state.finished = true;
                state.current_file_bytes = 0;
                state.report = report;
                self.callback.on_worker_done(index, state);
            }
        }
    }

    /// Drain every channel until all workers have hung up.
    ///
    /// Returns the final per-worker view.
    pub fn run(mut self, receivers: Vec<Receiver<ProgressEvent>>) -> Vec<WorkerProgress> {
        let mut select = Select::new();
        for receiver in &receivers {
            select.recv(receiver);
        }

        let mut live = receivers.len();
        while live > 0 {
            let operation = select.select();
            let index = operation.index();
            match operation.recv(&receivers[index]) {
                Ok(event) => self.apply(event),
                Err(_) => {
                    select.remove(index);
                    live -= 1;
                }
            }
        }

        self.workers
    }

    /// Sum of the final reports of all workers.
    #[must_use]
    pub fn total(workers: &[WorkerProgress]) -> WorkerReport {
        let mut total = WorkerReport::default();
        for worker in workers {
            total.merge(&worker.report);
        }
        total
    }
}
