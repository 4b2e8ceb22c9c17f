//! Ignore-glob and exclude-prefix matching.
//!
//! A path is filtered out when its base name matches any ignore glob, or
//! when any configured exclude directory is a prefix of it. Filtered paths
//! never produce file events, never appear in file lists, and never get a
//! baseline record.

use std::path::{Path, PathBuf};

use glob::Pattern;

/// Compiled ignore patterns plus exclude prefixes.
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<Pattern>,
    exclude_dirs: Vec<PathBuf>,
}

impl PathFilter {
    /// Compile a filter from glob pattern strings and exclude prefixes.
    pub fn new<S: AsRef<str>>(
        patterns: &[S],
        exclude_dirs: &[PathBuf],
    ) -> Result<Self, glob::PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            exclude_dirs: exclude_dirs.to_vec(),
        })
    }

    /// Whether a path is filtered out of synchronization.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if let Some(name) = path.file_name() {
            let name = name.to_string_lossy();
            if self.patterns.iter().any(|p| p.matches(&name)) {
                return true;
            }
        }
        self.exclude_dirs.iter().any(|dir| path.starts_with(dir))
    }

    /// Whether a path, or any of its ancestors below `root`, is filtered
    /// out.
    ///
    /// Recursive directory watches report events deep inside ignored
    /// subtrees (for example under `node_modules`); the ancestor walk
    /// keeps those events out even though their own base names pass the
    /// globs.
    pub fn is_ignored_under(&self, path: &Path, root: &Path) -> bool {
        let mut current = path;
        loop {
            if self.is_ignored(current) {
                return true;
            }
            match current.parent() {
                Some(parent) if parent.starts_with(root) && parent != root => current = parent,
                _ => return false,
            }
        }
    }
}

/// The default ignore list: platform litter, editor droppings, and common
/// cache/IDE/build folders.
pub fn default_ignore_patterns() -> Vec<String> {
    [
        ".DS_Store",
        "*.tmp",
        ".git",
        "node_modules",
        ".Trash",
        "*.swp",
        "*~",
        ".cache",
        "__pycache__",
        ".idea",
        ".vscode",
        "target",
        "Thumbs.db",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> PathFilter {
        PathFilter::new(&default_ignore_patterns(), &[]).unwrap()
    }

    #[test]
    fn default_list_catches_platform_litter() {
        let filter = default_filter();
        assert!(filter.is_ignored(Path::new("/home/a/Shared/.DS_Store")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/foo.tmp")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/.git")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/node_modules")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/edit.swp")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/backup~")));
    }

    #[test]
    fn regular_files_pass() {
        let filter = default_filter();
        assert!(!filter.is_ignored(Path::new("/home/a/Shared/note.txt")));
        assert!(!filter.is_ignored(Path::new("/home/a/Shared/docs/report.pdf")));
    }

    #[test]
    fn globs_match_basename_only() {
        let filter = PathFilter::new(&["*.log"], &[]).unwrap();
        // A directory named like the pattern elsewhere in the path is fine.
        assert!(!filter.is_ignored(Path::new("/x.log.d/keep.txt")));
        assert!(filter.is_ignored(Path::new("/x.log.d/drop.log")));
    }

    #[test]
    fn exclude_prefix_covers_whole_subtree() {
        let filter =
            PathFilter::new::<&str>(&[], &[PathBuf::from("/home/a/Shared/private")]).unwrap();
        assert!(filter.is_ignored(Path::new("/home/a/Shared/private")));
        assert!(filter.is_ignored(Path::new("/home/a/Shared/private/deep/file.txt")));
        assert!(!filter.is_ignored(Path::new("/home/a/Shared/privateer.txt")));
    }

    #[test]
    fn ancestor_walk_catches_ignored_parents() {
        let filter = default_filter();
        let root = Path::new("/home/a/Shared");

        // The file's own base name passes, but it lives under node_modules.
        assert!(filter.is_ignored_under(Path::new("/home/a/Shared/node_modules/x/index.js"), root));
        assert!(!filter.is_ignored_under(Path::new("/home/a/Shared/src/index.js"), root));
        // The root itself is never tested against the globs.
        assert!(!filter.is_ignored_under(Path::new("/home/a/target/plain.txt"), Path::new("/home/a/target")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(PathFilter::new(&["[unclosed"], &[]).is_err());
    }
}
