//! Comparing manifests: move replay scripts and duplicate reports.
//!
//! # Architecture
//!
//! - [`index`]: digest index and repeated-digest tracking
//! - [`comparator`]: matching digests across two manifests
//!
//! [`ManifestComparer`] runs the whole flow:
//! `Idle -> LoadingLeft -> LoadingRight -> Diffing -> EmittingCommands ->
//! EmittingDuplicates -> Done`. Without a right-hand manifest the loading
//! and diffing of the right side are skipped and only duplicates are
//! reported.

pub mod comparator;
pub mod index;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::manifest::{Manifest, ManifestError};
use crate::output::script::{ScriptOutput, Tee};

pub use comparator::{compare, Comparison, MoveCommands};
pub use index::{DigestIndex, DuplicateGroup, RepeatedDigests};

/// Stage of a comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePhase {
    /// Nothing started yet.
    Idle,
    /// Reading the left manifest.
    LoadingLeft,
    /// Reading the right manifest.
    LoadingRight,
    /// Matching digests.
    Diffing,
    /// Writing move commands.
    EmittingCommands,
    /// Writing the duplicate report.
    EmittingDuplicates,
    /// Finished.
    Done,
}

/// Errors raised while comparing manifests.
#[derive(thiserror::Error, Debug)]
pub enum CompareError {
    /// A manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The script or console could not be written.
    #[error("Failed to write {path}: {source}")]
    Output {
        /// Script path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Counts from a finished comparison.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompareSummary {
    /// Distinct digests in the left manifest
    pub left_digests: usize,
    /// Distinct digests in the right manifest
    pub right_digests: usize,
    /// Files at the same path on both sides
    pub unchanged: usize,
    /// Files to move
    pub moves: usize,
    /// Digests only on the left
    pub only_in_left: usize,
    /// Digests only on the right
    pub only_in_right: usize,
    /// Repeated digests
    pub duplicate_groups: usize,
    /// Script written, if any line was emitted
    pub script: Option<PathBuf>,
}

/// Runs a comparison and writes its output.
#[derive(Debug)]
pub struct ManifestComparer {
    script_path: PathBuf,
    phase: ComparePhase,
}

impl ManifestComparer {
    /// Create a comparer that writes its script to `script_path`.
    #[must_use]
    pub fn new(script_path: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            phase: ComparePhase::Idle,
        }
    }

    /// Current stage.
    #[must_use]
    pub fn phase(&self) -> ComparePhase {
        self.phase
    }

    fn enter(&mut self, phase: ComparePhase) {
        log::debug!("Compare: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Compare `left` with `right` (or look for duplicates in `left` alone).
    ///
    /// "Only in" listings go to `console`. Commands and the duplicate
    /// report go to both `console` and the script file.
    ///
    /// # Errors
    ///
    /// Returns [`CompareError`] if a manifest cannot be read or output
    /// cannot be written.
    pub fn run<W: Write>(
        &mut self,
        left: &Path,
        right: Option<&Path>,
        mut console: W,
    ) -> Result<CompareSummary, CompareError> {
        let mut repeated = RepeatedDigests::new();

        self.enter(ComparePhase::LoadingLeft);
        let left_index = DigestIndex::build(&Manifest::load(left)?, &mut repeated);

        let right_index = match right {
            Some(path) => {
                self.enter(ComparePhase::LoadingRight);
                Some(DigestIndex::build(&Manifest::load(path)?, &mut repeated))
            }
            None => None,
        };
        let right_digests = right_index.as_ref().map_or(0, DigestIndex::len);

        self.enter(ComparePhase::Diffing);
        let comparison = compare(&left_index, right_index, &repeated);

        let script_path = self.script_path.clone();
        let output_error = |source| CompareError::Output {
            path: script_path.clone(),
            source,
        };

        let output = ScriptOutput::new(&comparison);
        output
            .write_listing(
                &mut console,
                &left.display().to_string(),
                &right.map(|p| p.display().to_string()).unwrap_or_default(),
            )
            .map_err(output_error)?;

        let mut tee = Tee::new(script_path.clone(), &mut console);
        self.enter(ComparePhase::EmittingCommands);
        output.write_commands(&mut tee).map_err(output_error)?;
        self.enter(ComparePhase::EmittingDuplicates);
        output.write_duplicates(&mut tee).map_err(output_error)?;
        let script = tee.finish().map_err(output_error)?;
        self.enter(ComparePhase::Done);

        if let Some(path) = &script {
            log::info!("Script written to {}", path.display());
        }

        Ok(CompareSummary {
            left_digests: left_index.len(),
            right_digests,
            unchanged: comparison.unchanged,
            moves: comparison.commands.moves.len(),
            only_in_left: comparison.only_in_left.len(),
            only_in_right: comparison.only_in_right.len(),
            duplicate_groups: comparison.duplicates.len(),
            script,
        })
    }
}
