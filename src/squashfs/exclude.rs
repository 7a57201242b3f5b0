//! Exclusion-list algebra for mksquashfs.
//!
//! Callers walk a diff stream and announce each path as kept or dropped.
//! Excluding a directory implicitly excludes everything beneath it, so the
//! two operations have to cooperate: a path can only be excluded while no
//! kept path lives under it, and keeping a path retracts the exclusion of
//! every ancestor that would otherwise hide it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Include/exclude decisions over absolute host paths.
#[derive(Debug, Default)]
pub struct ExcludePaths {
    exclude: BTreeSet<PathBuf>,
    include: Vec<PathBuf>,
}

impl ExcludePaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a path for omission from the archive.
    ///
    /// No-op when an already-included path lives at or under `path`:
    /// if /usr/bin/ls changed but /usr hasn't, /usr must not be listed,
    /// or the changed file would silently vanish from the layer.
    pub fn add_exclude(&mut self, path: &Path) {
        if self.include.iter().any(|inc| inc.starts_with(path)) {
            return;
        }
        self.exclude.insert(path.to_path_buf());
    }

    /// Keep a path, retracting any ancestor exclusions that would hide it.
    ///
    /// For a non-directory the walk starts at its parent: the file itself
    /// was never excluded, only its ancestors could have been.
    pub fn add_include(&mut self, orig: &Path, is_dir: bool) {
        let start = if is_dir {
            orig
        } else {
            orig.parent().unwrap_or(orig)
        };

        let mut p = start;
        loop {
            if p == Path::new("/") {
                break;
            }
            self.exclude.remove(p);
            match p.parent() {
                Some(parent) => p = parent,
                None => break,
            }
        }

        // Record only the deepest paths; a kept descendant already protects
        // every ancestor a shallower entry would.
        if self.include.iter().any(|inc| inc.starts_with(orig)) {
            return;
        }
        self.include.retain(|inc| !orig.starts_with(inc));
        self.include.push(orig.to_path_buf());
    }

    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty()
    }

    /// Render the exclusion list in mksquashfs `-ef` syntax:
    /// newline-separated paths terminated by a blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in &self.exclude {
            out.push_str(&path.to_string_lossy());
            out.push('\n');
        }
        out.push('\n');
        out
    }

    #[cfg(test)]
    fn excluded(&self, path: &str) -> bool {
        self.exclude.contains(Path::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_retracts_ancestor_excludes() {
        let mut paths = ExcludePaths::new();
        paths.add_exclude(Path::new("/r/usr"));
        paths.add_exclude(Path::new("/r/usr/bin"));
        paths.add_exclude(Path::new("/r/usr/share"));

        paths.add_include(Path::new("/r/usr/bin/ls"), false);

        assert!(!paths.excluded("/r/usr"));
        assert!(!paths.excluded("/r/usr/bin"));
        // siblings of the kept file's ancestry stay excluded
        assert!(paths.excluded("/r/usr/share"));
    }

    #[test]
    fn test_exclude_refuses_ancestors_of_includes() {
        let mut paths = ExcludePaths::new();
        paths.add_include(Path::new("/r/usr/bin/ls"), false);

        paths.add_exclude(Path::new("/r/usr"));
        paths.add_exclude(Path::new("/r/usr/bin"));

        assert!(!paths.excluded("/r/usr"));
        assert!(!paths.excluded("/r/usr/bin"));
    }

    #[test]
    fn test_exclude_prefix_is_component_wise() {
        let mut paths = ExcludePaths::new();
        paths.add_include(Path::new("/r/usr/bin/ls"), false);

        // /r/us is a string prefix of the include but not a path ancestor
        paths.add_exclude(Path::new("/r/us"));
        assert!(paths.excluded("/r/us"));
    }

    #[test]
    fn test_include_dir_starts_retraction_at_itself() {
        let mut paths = ExcludePaths::new();
        paths.add_exclude(Path::new("/r/etc"));
        paths.add_include(Path::new("/r/etc"), true);
        assert!(!paths.excluded("/r/etc"));
    }

    #[test]
    fn test_render_terminated_by_blank_line() {
        let mut paths = ExcludePaths::new();
        paths.add_exclude(Path::new("/r/a"));
        paths.add_exclude(Path::new("/r/b"));

        let text = paths.render();
        assert!(text.ends_with("\n\n"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["/r/a", "/r/b"]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut paths = ExcludePaths::new();
        for p in ["/r/z", "/r/a", "/r/m"] {
            paths.add_exclude(Path::new(p));
        }
        assert_eq!(paths.render(), paths.render());
    }

    #[test]
    fn test_no_exclude_is_prefix_of_any_include() {
        // Interleave operations in an adversarial order and check the
        // subtree-safety invariant over the final state.
        let mut paths = ExcludePaths::new();
        paths.add_exclude(Path::new("/r/usr"));
        paths.add_include(Path::new("/r/usr/bin/ls"), false);
        paths.add_exclude(Path::new("/r/usr/bin"));
        paths.add_include(Path::new("/r/usr/share/man/man1"), true);
        paths.add_exclude(Path::new("/r/usr/share"));
        paths.add_exclude(Path::new("/r/var"));

        for inc in &paths.include {
            for exc in &paths.exclude {
                assert!(
                    !inc.starts_with(exc),
                    "exclude {} hides include {}",
                    exc.display(),
                    inc.display()
                );
            }
        }
    }

    #[test]
    fn test_redundant_includes_not_retained() {
        let mut paths = ExcludePaths::new();
        paths.add_include(Path::new("/r/usr"), true);
        paths.add_include(Path::new("/r/usr/bin/ls"), false);
        paths.add_include(Path::new("/r/usr/bin/ls"), false);

        assert_eq!(paths.include, vec![PathBuf::from("/r/usr/bin/ls")]);
    }
}
