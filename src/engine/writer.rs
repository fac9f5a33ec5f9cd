//! The single consumer that turns worker results into a manifest file.
//!
//! # Overview
//!
//! [`ManifestWriter`] owns the output file. In replace mode it writes to
//! `<manifest>.new` and renames over the target on success, so the old
//! manifest stays intact until the new one is complete. In append mode it
//! appends to the existing manifest directly.
//!
//! [`WriterPipeline`] drives a writer from the results channel on its own
//! thread. It polls the shutdown flag between receives and finalizes the
//! file itself, so the signal handler never touches the filesystem.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::worker::{HashResult, RecordOrigin};
use crate::manifest::{encode_header, temp_path, FileRecord, ManifestError};

/// Default number of records between explicit flushes.
pub const DEFAULT_WRITE_FREQUENCY: usize = 100;

/// How often the pipeline wakes to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How the writer treats an existing manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write a fresh manifest to a temporary file and rename it into place.
    Replace,
    /// Append new records to the existing manifest.
    Append,
}

/// What finalizing the writer did to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The temporary file replaced the manifest.
    Replaced,
    /// The temporary file held only the header and was deleted.
    Discarded,
    /// Records were appended in place.
    Appended,
    /// A previous call already finalized the writer.
    AlreadyDone,
}

/// Buffered manifest writer with a one-shot finalize.
#[derive(Debug)]
pub struct ManifestWriter {
    target: PathBuf,
    temp: Option<PathBuf>,
    out: Option<BufWriter<File>>,
    write_frequency: usize,
    pending: usize,
    records_written: usize,
    publish_empty: bool,
    finalized: bool,
}

impl ManifestWriter {
    /// Open a writer for `target`.
    ///
    /// Replace mode always starts a new temporary file with the header.
    /// Append mode writes the header only when the manifest is new or empty,
    /// and first terminates an existing last line that lacks its newline.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be created or the
    /// header cannot be written.
    pub fn create(
        target: &Path,
        algorithm: &str,
        mode: WriteMode,
        write_frequency: usize,
    ) -> Result<Self, ManifestError> {
        let (path, temp, file, needs_header) = match mode {
            WriteMode::Replace => {
                let temp = temp_path(target);
                let file = File::create(&temp).map_err(|e| ManifestError::from_io(&temp, e))?;
                (temp.clone(), Some(temp), file, true)
            }
            WriteMode::Append => {
                let existing_len = std::fs::metadata(target).map(|m| m.len()).unwrap_or(0);
                let mut file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(target)
                    .map_err(|e| ManifestError::from_io(target, e))?;
                if existing_len > 0 && !ends_with_newline(&mut file, existing_len) {
                    log::warn!(
                        "{} does not end with a newline, terminating its last line",
                        target.display()
                    );
                    file.write_all(b"\n")
                        .map_err(|e| ManifestError::from_io(target, e))?;
                }
                (target.to_path_buf(), None, file, existing_len == 0)
            }
        };

        let mut out = BufWriter::new(file);
        if needs_header {
            writeln!(out, "{}", encode_header(algorithm))
                .map_err(|e| ManifestError::from_io(&path, e))?;
        }
        log::debug!("Writing manifest records to {}", path.display());

        Ok(Self {
            target: target.to_path_buf(),
            temp,
            out: Some(out),
            write_frequency: write_frequency.max(1),
            pending: 0,
            records_written: 0,
            publish_empty: false,
            finalized: false,
        })
    }

    /// Whether a replace-mode manifest with no records still replaces the
    /// target. A fresh `generate` of an empty tree must not leave the old
    /// records behind; an `update` keeps the old file instead.
    #[must_use]
    pub fn publish_empty(mut self, publish: bool) -> Self {
        self.publish_empty = publish;
        self
    }

    /// The manifest this writer produces.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    fn current_path(&self) -> &Path {
        self.temp.as_deref().unwrap_or(&self.target)
    }

    /// Write one record, flushing every `write_frequency` records.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] on a write failure, or if the writer
    /// was already finalized.
    pub fn write_record(&mut self, record: &FileRecord) -> Result<(), ManifestError> {
        let path = self.current_path().to_path_buf();
        let Some(out) = self.out.as_mut() else {
            return Err(ManifestError::Io {
                path,
                source: std::io::Error::other("manifest writer already finalized"),
            });
        };
        writeln!(out, "{}", record.encode()).map_err(|e| ManifestError::from_io(&path, e))?;
        self.records_written += 1;
        self.pending += 1;
        if self.pending >= self.write_frequency {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush buffered records to disk.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the flush fails.
    pub fn flush(&mut self) -> Result<(), ManifestError> {
        let path = self.current_path().to_path_buf();
        if let Some(out) = self.out.as_mut() {
            out.flush().map_err(|e| ManifestError::from_io(&path, e))?;
        }
        self.pending = 0;
        Ok(())
    }

    /// Flush, close and put the manifest in its final place.
    ///
    /// Safe to call more than once: later calls return
    /// [`Finalized::AlreadyDone`] and touch nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if flushing, renaming or deleting fails.
    pub fn cleanup(&mut self) -> Result<Finalized, ManifestError> {
        if self.finalized {
            return Ok(Finalized::AlreadyDone);
        }
        self.finalized = true;

        let Some(mut out) = self.out.take() else {
            return Ok(Finalized::AlreadyDone);
        };
        let path = self.current_path().to_path_buf();
        out.flush().map_err(|e| ManifestError::from_io(&path, e))?;
        drop(out);

        let Some(temp) = self.temp.as_ref() else {
            log::debug!(
                "Appended {} records to {}",
                self.records_written,
                self.target.display()
            );
            return Ok(Finalized::Appended);
        };

        if self.records_written > 0 || self.publish_empty {
            std::fs::rename(temp, &self.target).map_err(|e| ManifestError::from_io(temp, e))?;
            log::debug!(
                "Renamed {} over {}",
                temp.display(),
                self.target.display()
            );
            Ok(Finalized::Replaced)
        } else {
            std::fs::remove_file(temp).map_err(|e| ManifestError::from_io(temp, e))?;
            log::debug!("No records written, removed {}", temp.display());
            Ok(Finalized::Discarded)
        }
    }

    /// Close without publishing: the temporary file is removed and the
    /// target is left as it was.
    pub fn abort(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.out = None;
        if let Some(temp) = self.temp.as_ref() {
            if let Err(e) = std::fs::remove_file(temp) {
                log::warn!("Failed to remove {}: {}", temp.display(), e);
            }
        }
    }
}

impl Drop for ManifestWriter {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            log::error!("Failed to finalize {}: {}", self.target.display(), e);
        }
    }
}

/// Whether the last of `len` bytes in `file` is a line feed.
fn ends_with_newline(file: &mut File, len: u64) -> bool {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map_or(true, |()| last[0] == b'\n')
}

/// What the pipeline did, returned when it stops.
#[derive(Debug, Clone, Default)]
pub struct WriterReport {
    /// Records written to the manifest
    pub records_written: usize,
    /// Cached results received but not written (append mode)
    pub records_dropped: usize,
    /// Identity keys of every result received
    pub seen_keys: HashSet<String>,
    /// Whether the pipeline stopped because of shutdown
    pub interrupted: bool,
    /// How the manifest was finalized
    pub finalized: Option<Finalized>,
}

/// Drives a [`ManifestWriter`] from the workers' results channel.
#[derive(Debug)]
pub struct WriterPipeline {
    writer: ManifestWriter,
    results: Receiver<HashResult>,
    shutdown_flag: Arc<AtomicBool>,
    write_cached: bool,
}

impl WriterPipeline {
    /// Create a pipeline.
    ///
    /// When `write_cached` is false, results whose digest came from the
    /// cache are counted but not written (append mode: they are already in
    /// the file).
    #[must_use]
    pub fn new(
        writer: ManifestWriter,
        results: Receiver<HashResult>,
        shutdown_flag: Arc<AtomicBool>,
        write_cached: bool,
    ) -> Self {
        Self {
            writer,
            results,
            shutdown_flag,
            write_cached,
        }
    }

    /// Consume results until every worker has hung up or shutdown is
    /// requested, then finalize the manifest.
    ///
    /// The receiver is dropped on return, so workers still sending notice
    /// and stop.
    ///
    /// # Errors
    ///
    /// A write failure aborts the run: the temporary file is removed and
    /// the error returned.
    pub fn run(self) -> Result<WriterReport, ManifestError> {
        let Self {
            mut writer,
            results,
            shutdown_flag,
            write_cached,
        } = self;
        let mut report = WriterReport::default();

        loop {
            if shutdown_flag.load(Ordering::SeqCst) {
                log::debug!("Writer: Shutdown requested, finalizing");
                report.interrupted = true;
                break;
            }
            match results.recv_timeout(POLL_INTERVAL) {
                Ok(result) => {
                    report.seen_keys.insert(result.record.identity_key.clone());
                    if result.origin == RecordOrigin::Cached && !write_cached {
                        report.records_dropped += 1;
                        continue;
                    }
                    if let Err(e) = writer.write_record(&result.record) {
                        log::error!("{}", e);
                        writer.abort();
                        return Err(e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        drop(results);

        if report.interrupted {
            writer.publish_empty = false;
        }
        report.records_written = writer.records_written();
        report.finalized = Some(writer.cleanup()?);
        Ok(report)
    }
}
