//! Change sets between two remote revisions.
//!
//! A changeset is transient, never persisted. The decomposition of remote
//! file statuses into the three buckets, including the `renamed` →
//! removed + added split, lives in [`resolve_changeset`] and nowhere else.

use std::collections::BTreeSet;

use tracing::warn;

use crate::preserve::PreservedPaths;

/// Paths changed between an old and a new revision, relative to the
/// package root. A path appears in at most one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Changeset {
    /// Whether all three buckets are empty.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of affected paths.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Paths to fetch: the union of added and modified, in order.
    pub fn paths_to_fetch(&self) -> Vec<String> {
        self.added.iter().chain(self.modified.iter()).cloned().collect()
    }

    /// A copy with every preserved path dropped from every bucket.
    ///
    /// Preservation takes precedence over the changeset: a preserved path is
    /// neither deleted nor overwritten even when the remote changed it.
    pub fn without_preserved(&self, preserved: &PreservedPaths) -> Changeset {
        let keep = |set: &BTreeSet<String>| {
            set.iter()
                .filter(|p| !preserved.is_preserved(p))
                .cloned()
                .collect::<BTreeSet<String>>()
        };
        let filtered = Changeset {
            added: keep(&self.added),
            modified: keep(&self.modified),
            removed: keep(&self.removed),
        };
        let dropped = self.len() - filtered.len();
        if dropped > 0 {
            warn!("skipping {} preserved path(s) named by the changeset", dropped);
        }
        filtered
    }
}

/// One file entry reported by a revision comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileChange {
    pub path: String,
    pub status: String,
    pub previous_path: Option<String>,
}

/// Classify remote file entries into a changeset.
///
/// `renamed` decomposes into one removal of the previous path and one
/// addition of the new path. Statuses outside the known set degrade to
/// `modified`, so a novel status costs a redundant re-download instead of a
/// missed file. The buckets are normalized to be disjoint afterwards: a
/// path both removed and re-added collapses to `modified`.
pub fn resolve_changeset<I>(entries: I) -> Changeset
where
    I: IntoIterator<Item = RemoteFileChange>,
{
    let mut changeset = Changeset::default();

    for entry in entries {
        match entry.status.as_str() {
            "added" => {
                changeset.added.insert(entry.path);
            }
            "modified" => {
                changeset.modified.insert(entry.path);
            }
            "removed" => {
                changeset.removed.insert(entry.path);
            }
            "renamed" => {
                let previous = entry.previous_path.unwrap_or_else(|| entry.path.clone());
                changeset.removed.insert(previous);
                changeset.added.insert(entry.path);
            }
            other => {
                warn!("unknown file status {:?}, treating as modified", other);
                changeset.modified.insert(entry.path);
            }
        }
    }

    // Disjointness: a delete paired with a re-add is a content replacement;
    // anything being fetched must not also be queued for removal.
    let replaced: Vec<String> = changeset
        .added
        .intersection(&changeset.removed)
        .cloned()
        .collect();
    for path in replaced {
        changeset.added.remove(&path);
        changeset.removed.remove(&path);
        changeset.modified.insert(path);
    }
    let added = changeset.added.clone();
    changeset.modified.retain(|p| !added.contains(p));
    let fetched: BTreeSet<String> = changeset
        .added
        .union(&changeset.modified)
        .cloned()
        .collect();
    changeset.removed.retain(|p| !fetched.contains(p));

    changeset
}
