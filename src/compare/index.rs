//! Content-digest index over a manifest, with duplicate tracking.

use std::collections::HashMap;

use crate::manifest::{FileRecord, Manifest};

/// Files that share a content digest, in one group per digest.
///
/// Filled while indexes are built: the first collision on a digest adds
/// both the earlier and the new record, later collisions add only the new
/// one.
#[derive(Debug, Clone, Default)]
pub struct RepeatedDigests {
    groups: HashMap<String, Vec<FileRecord>>,
}

/// All copies of one digest.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Shared content digest
    pub digest: String,
    /// Size of the first member
    pub size: u64,
    /// Members sorted by (directory, filename)
    pub members: Vec<FileRecord>,
}

impl RepeatedDigests {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `new` has the same digest as the already indexed `previous`.
    pub fn record_collision(&mut self, previous: &FileRecord, new: &FileRecord) {
        self.groups
            .entry(new.digest.clone())
            .or_insert_with(|| vec![previous.clone()])
            .push(new.clone());
    }

    /// Number of repeated digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no digest was repeated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `digest` was seen more than once.
    #[must_use]
    pub fn contains(&self, digest: &str) -> bool {
        self.groups.contains_key(digest)
    }

    /// Groups ordered by their smallest `(directory, filename)` member.
    #[must_use]
    pub fn groups(&self) -> Vec<DuplicateGroup> {
        let mut groups: Vec<DuplicateGroup> = self
            .groups
            .iter()
            .map(|(digest, members)| {
                let size = members.first().map_or(0, |r| r.size);
                let mut members = members.clone();
                members.sort_by(|a, b| {
                    (&a.directory, &a.filename).cmp(&(&b.directory, &b.filename))
                });
                DuplicateGroup {
                    digest: digest.clone(),
                    size,
                    members,
                }
            })
            .collect();
        groups.sort_by(|a, b| {
            let key = |g: &DuplicateGroup| {
                g.members
                    .first()
                    .map(|r| (r.directory.clone(), r.filename.clone()))
            };
            key(a).cmp(&key(b)).then_with(|| a.digest.cmp(&b.digest))
        });
        groups
    }
}

/// Digest to record map for one manifest. The last record wins.
#[derive(Debug, Clone, Default)]
pub struct DigestIndex {
    entries: HashMap<String, FileRecord>,
}

impl DigestIndex {
    /// Index `manifest`, noting repeated digests in `repeated`.
    #[must_use]
    pub fn build(manifest: &Manifest, repeated: &mut RepeatedDigests) -> Self {
        let mut entries: HashMap<String, FileRecord> = HashMap::with_capacity(manifest.len());
        for record in &manifest.records {
            if let Some(previous) = entries.insert(record.digest.clone(), record.clone()) {
                repeated.record_collision(&previous, record);
            }
        }
        log::debug!(
            "Indexed {} distinct digests from {} ({} repeated)",
            entries.len(),
            manifest.path.display(),
            repeated.len()
        );
        Self { entries }
    }

    /// Look up a digest.
    #[must_use]
    pub fn get(&self, digest: &str) -> Option<&FileRecord> {
        self.entries.get(digest)
    }

    /// Remove and return the record for a digest.
    pub fn take(&mut self, digest: &str) -> Option<FileRecord> {
        self.entries.remove(digest)
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(digest, record)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.entries.iter()
    }

    /// Consume the index, yielding its records in arbitrary order.
    pub fn into_records(self) -> impl Iterator<Item = FileRecord> {
        self.entries.into_values()
    }
}
