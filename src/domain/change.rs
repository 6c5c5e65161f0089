//! Change detection between two scans
//!
//! Compares fingerprints keyed by source path. A path present only in the
//! current scan is added, present only in the previous scan is removed, and
//! present in both with different fingerprints is modified.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use super::node::Fingerprint;

/// Source units that changed since the previous scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: BTreeSet<PathBuf>,
    pub modified: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeSet {
    /// Returns true if nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Total number of changed units
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Paths whose current contents must be (re)loaded
    pub fn touched(&self) -> impl Iterator<Item = &PathBuf> {
        self.added.iter().chain(self.modified.iter())
    }

    /// Returns true if `path` was added or modified
    pub fn is_touched(&self, path: &PathBuf) -> bool {
        self.added.contains(path) || self.modified.contains(path)
    }
}

/// Compares previous and current fingerprints per source unit
pub fn detect_changes(
    previous: &BTreeMap<PathBuf, Fingerprint>,
    current: &BTreeMap<PathBuf, Fingerprint>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, fingerprint) in current {
        match previous.get(path) {
            None => {
                changes.added.insert(path.clone());
            }
            Some(prev) if prev != fingerprint => {
                changes.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in previous.keys() {
        if !current.contains_key(path) {
            changes.removed.insert(path.clone());
        }
    }

    tracing::debug!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        "detected changes"
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prints(entries: &[(&str, &str)]) -> BTreeMap<PathBuf, Fingerprint> {
        entries
            .iter()
            .map(|(p, f)| (PathBuf::from(p), Fingerprint::new(*f)))
            .collect()
    }

    #[test]
    fn no_changes() {
        let a = prints(&[("a.clj", "1"), ("b.clj", "2")]);
        let changes = detect_changes(&a, &a.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);
    }

    #[test]
    fn classifies_added_modified_removed() {
        let previous = prints(&[("a.clj", "1"), ("b.clj", "2"), ("c.clj", "3")]);
        let current = prints(&[("a.clj", "1"), ("b.clj", "2x"), ("d.clj", "4")]);

        let changes = detect_changes(&previous, &current);
        assert_eq!(changes.added, BTreeSet::from([PathBuf::from("d.clj")]));
        assert_eq!(changes.modified, BTreeSet::from([PathBuf::from("b.clj")]));
        assert_eq!(changes.removed, BTreeSet::from([PathBuf::from("c.clj")]));
        assert_eq!(changes.len(), 3);

        let touched: Vec<_> = changes.touched().cloned().collect();
        assert_eq!(touched, vec![PathBuf::from("d.clj"), PathBuf::from("b.clj")]);
        assert!(changes.is_touched(&PathBuf::from("b.clj")));
        assert!(!changes.is_touched(&PathBuf::from("c.clj")));
    }

    #[test]
    fn first_scan_adds_everything() {
        let current = prints(&[("a.clj", "1"), ("b.clj", "2")]);
        let changes = detect_changes(&BTreeMap::new(), &current);
        assert_eq!(changes.added.len(), 2);
        assert!(changes.modified.is_empty());
    }
}
