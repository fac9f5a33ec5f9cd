//! Move detection between two manifests.
//!
//! Files are matched by content digest. A digest present in both manifests
//! at a different path becomes a `mv`, plus a `mkdir` for the destination
//! directory and a commented `rmdir` for the source directory when the
//! file changed directory.

use std::collections::BTreeSet;

use super::index::{DigestIndex, DuplicateGroup, RepeatedDigests};
use crate::manifest::FileRecord;
use crate::output::script::shell_quote;

/// Shell commands that turn the left tree into the right tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveCommands {
    /// `mkdir -pv` commands, sorted
    pub mkdirs: BTreeSet<String>,
    /// `mv -v` commands, sorted
    pub moves: BTreeSet<String>,
    /// `rmdir -v` commands, sorted ascending; emitted in reverse
    pub rmdirs: BTreeSet<String>,
}

impl MoveCommands {
    /// Whether any file needs to move.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    fn add(&mut self, from: &FileRecord, to: &FileRecord) {
        if from.directory != to.directory {
            self.mkdirs
                .insert(format!("mkdir -pv {}", shell_quote(&to.directory)));
            if from.directory != "." {
                self.rmdirs
                    .insert(format!("rmdir -v {}", shell_quote(&from.directory)));
            }
        }
        self.moves.insert(format!(
            "mv -v {} {}",
            shell_quote(&from.path()),
            shell_quote(&to.path())
        ));
    }
}

/// Everything learned from comparing one or two manifests.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Paths whose digest appears only in the left manifest, sorted
    pub only_in_left: Vec<String>,
    /// Paths whose digest appears only in the right manifest, sorted
    pub only_in_right: Vec<String>,
    /// Digests found at the same path in both manifests
    pub unchanged: usize,
    /// Commands to replay moves
    pub commands: MoveCommands,
    /// Digests repeated within either manifest
    pub duplicates: Vec<DuplicateGroup>,
    /// Whether a right-hand manifest took part
    pub has_right: bool,
}

/// Compare `left` against an optional `right`.
///
/// Without a right-hand index only the duplicate report is meaningful.
#[must_use]
pub fn compare(
    left: &DigestIndex,
    right: Option<DigestIndex>,
    repeated: &RepeatedDigests,
) -> Comparison {
    let mut comparison = Comparison {
        duplicates: repeated.groups(),
        has_right: right.is_some(),
        ..Comparison::default()
    };

    let Some(mut right) = right else {
        return comparison;
    };

    for (digest, from) in left.iter() {
        match right.take(digest) {
            None => comparison.only_in_left.push(from.path()),
            Some(to) if to.directory == from.directory && to.filename == from.filename => {
                comparison.unchanged += 1;
            }
            Some(to) => comparison.commands.add(from, &to),
        }
    }
    comparison.only_in_right = right.into_records().map(|r| r.path()).collect();

    comparison.only_in_left.sort();
    comparison.only_in_right.sort();

    log::debug!(
        "Compared manifests: {} unchanged, {} moved, {} only left, {} only right",
        comparison.unchanged,
        comparison.commands.moves.len(),
        comparison.only_in_left.len(),
        comparison.only_in_right.len()
    );
    comparison
}
