//! Manifest comparison - the typed change stream layers are built from.

use super::{Entry, Manifest};

/// Change kind for one path, carrying the metadata of the sides that exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffKind {
    /// Present and identical on both sides.
    Same { new: Entry },
    /// Present on both sides with differing keywords.
    Modified { old: Entry, new: Entry },
    /// Present only in the new walk.
    Extra { new: Entry },
    /// Present only in the prior manifest.
    Missing { old: Entry },
}

/// One diffed path. `path` is rootfs-relative (`.` for the root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub path: String,
    pub kind: DiffKind,
}

impl DiffEntry {
    /// Directory-ness of the side that drives archiving decisions:
    /// the old side for Missing, the new side otherwise.
    pub fn is_dir(&self) -> bool {
        match &self.kind {
            DiffKind::Same { new } | DiffKind::Modified { new, .. } | DiffKind::Extra { new } => {
                new.is_dir()
            }
            DiffKind::Missing { old } => old.is_dir(),
        }
    }

    fn tag(&self) -> u8 {
        match self.kind {
            DiffKind::Same { .. } => 0,
            DiffKind::Modified { .. } => 1,
            DiffKind::Extra { .. } => 2,
            DiffKind::Missing { .. } => 3,
        }
    }
}

/// Compare a prior manifest against the current walk.
///
/// Every path in the union of the two appears exactly once in the result,
/// sorted with parents before children.
pub fn compare(prior: &Manifest, current: &Manifest) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    let paths: std::collections::BTreeSet<&String> =
        prior.entries.keys().chain(current.entries.keys()).collect();

    for path in paths {
        let kind = match (prior.entries.get(path), current.entries.get(path)) {
            (Some(old), Some(new)) => {
                if old.same_as(new) {
                    DiffKind::Same { new: new.clone() }
                } else {
                    DiffKind::Modified {
                        old: old.clone(),
                        new: new.clone(),
                    }
                }
            }
            (None, Some(new)) => DiffKind::Extra { new: new.clone() },
            (Some(old), None) => DiffKind::Missing { old: old.clone() },
            (None, None) => unreachable!(),
        };
        out.push(DiffEntry {
            path: path.clone(),
            kind,
        });
    }

    out
}

/// Drop the rootfs root itself; metadata changes on `.` never force a layer.
pub fn filter_ignore_root(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
    entries.into_iter().filter(|e| e.path != ".").collect()
}

/// Collapse uniform subtrees: when a directory and everything beneath it
/// carry the same change kind, the children are redundant and only the
/// directory entry is kept.
pub fn simplify(entries: Vec<DiffEntry>) -> Vec<DiffEntry> {
    use std::collections::{HashMap, HashSet};

    let mut drop = vec![false; entries.len()];
    {
        let tags: HashMap<&str, u8> = entries.iter().map(|e| (e.path.as_str(), e.tag())).collect();

        // An ancestor is "mixed" if any strict descendant differs in kind
        let mut mixed: HashSet<&str> = HashSet::new();
        for entry in &entries {
            let mut ancestor = entry.path.as_str();
            while let Some(cut) = ancestor.rfind('/') {
                ancestor = &ancestor[..cut];
                if tags.get(ancestor).is_some_and(|&t| t != entry.tag()) {
                    mixed.insert(ancestor);
                }
            }
        }

        for (i, entry) in entries.iter().enumerate() {
            let mut ancestor = entry.path.as_str();
            while let Some(cut) = ancestor.rfind('/') {
                ancestor = &ancestor[..cut];
                if tags.contains_key(ancestor) && !mixed.contains(ancestor) {
                    drop[i] = true;
                    break;
                }
            }
        }
    }

    entries
        .into_iter()
        .zip(drop)
        .filter_map(|(e, dropped)| (!dropped).then_some(e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{walk_rootfs, FsEval};
    use std::fs;
    use tempfile::TempDir;

    fn kinds(entries: &[DiffEntry]) -> Vec<(&str, u8)> {
        entries.iter().map(|e| (e.path.as_str(), e.tag())).collect()
    }

    fn find<'a>(entries: &'a [DiffEntry], path: &str) -> &'a DiffEntry {
        entries
            .iter()
            .find(|e| e.path == path)
            .unwrap_or_else(|| panic!("no diff entry for {}", path))
    }

    #[test]
    fn test_unchanged_rootfs_is_all_same() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/hosts"), "x").unwrap();

        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = compare(&prior, &current);
        assert!(diffs.iter().all(|e| matches!(e.kind, DiffKind::Same { .. })));
    }

    #[test]
    fn test_added_file_is_extra() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("etc")).unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::write(tmp.path().join("etc/hello"), "hi\n").unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = compare(&prior, &current);
        assert!(matches!(
            find(&diffs, "etc/hello").kind,
            DiffKind::Extra { .. }
        ));
        // the parent directory changed too (its contents did)
        assert!(matches!(
            find(&diffs, "etc").kind,
            DiffKind::Same { .. } | DiffKind::Modified { .. }
        ));
    }

    #[test]
    fn test_deleted_file_is_missing_with_old_metadata() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/hosts"), "x").unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::remove_file(tmp.path().join("etc/hosts")).unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = compare(&prior, &current);
        let entry = find(&diffs, "etc/hosts");
        match &entry.kind {
            DiffKind::Missing { old } => assert!(!old.is_dir()),
            other => panic!("expected Missing, got {:?}", other),
        }
    }

    #[test]
    fn test_modified_file_has_both_sides() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file"), "one").unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::write(tmp.path().join("file"), "two").unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = compare(&prior, &current);
        match &find(&diffs, "file").kind {
            DiffKind::Modified { old, new } => {
                assert_ne!(old.sha256, new.sha256);
            }
            other => panic!("expected Modified, got {:?}", other),
        }
    }

    #[test]
    fn test_each_path_appears_once() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("d")).unwrap();
        fs::write(tmp.path().join("d/f"), "x").unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();
        fs::write(tmp.path().join("d/g"), "y").unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = compare(&prior, &current);
        let mut paths: Vec<_> = diffs.iter().map(|e| &e.path).collect();
        paths.dedup();
        assert_eq!(paths.len(), diffs.len());
    }

    #[test]
    fn test_filter_ignore_root() {
        let tmp = TempDir::new().unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = filter_ignore_root(compare(&prior, &current));
        assert!(diffs.iter().all(|e| e.path != "."));
    }

    #[test]
    fn test_simplify_collapses_new_subtree() {
        let tmp = TempDir::new().unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::create_dir_all(tmp.path().join("newdir/sub")).unwrap();
        fs::write(tmp.path().join("newdir/a"), "a").unwrap();
        fs::write(tmp.path().join("newdir/sub/b"), "b").unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = simplify(filter_ignore_root(compare(&prior, &current)));
        assert_eq!(kinds(&diffs), vec![("newdir", 2)]);
    }

    #[test]
    fn test_simplify_keeps_mixed_subtree() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("etc")).unwrap();
        fs::write(tmp.path().join("etc/hosts"), "x").unwrap();
        fs::write(tmp.path().join("etc/motd"), "m").unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::write(tmp.path().join("etc/hosts"), "changed").unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = simplify(filter_ignore_root(compare(&prior, &current)));
        // etc is mixed (one child modified, one same), so children survive
        assert!(diffs.iter().any(|e| e.path == "etc/hosts"));
        assert!(diffs.iter().any(|e| e.path == "etc/motd"));
    }

    #[test]
    fn test_simplify_collapses_deleted_subtree() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("gone")).unwrap();
        fs::write(tmp.path().join("gone/f"), "x").unwrap();
        let prior = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        fs::remove_dir_all(tmp.path().join("gone")).unwrap();
        let current = walk_rootfs(tmp.path(), FsEval::Rootless).unwrap();

        let diffs = simplify(filter_ignore_root(compare(&prior, &current)));
        assert_eq!(kinds(&diffs), vec![("gone", 3)]);
    }
}
