//! File-tree filtering: decides whether a path belongs to a language's
//! source or test set.
//!
//! A filter combines a list of directories (relative to a base dir) with a
//! list of filename regex patterns. A path matches when it sits under one of
//! the directories (any path under the base dir when the list is empty) AND
//! its name matches at least one pattern (any name when the list is empty).

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid file pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("unreachable directories: {}", format_dirs(.unreachable))]
    UnreachableDirectories {
        /// Files found under the directories that were reachable.
        found: Vec<PathBuf>,
        unreachable: Vec<PathBuf>,
    },
}

fn format_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Directory + filename-pattern filter over a source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeFilter {
    /// Directories relative to the base dir. Empty means "anywhere under
    /// the base dir".
    pub directories: Vec<String>,
    /// Filename regex patterns, OR-combined. Empty means "any name".
    pub file_patterns: Vec<String>,
}

impl FileTreeFilter {
    pub fn new(
        directories: impl IntoIterator<Item = impl Into<String>>,
        file_patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            directories: directories.into_iter().map(Into::into).collect(),
            file_patterns: file_patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile every pattern once, rejecting the filter if any is malformed.
    pub fn validate(&self) -> Result<(), FilterError> {
        for pattern in &self.file_patterns {
            Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Whether `path` falls under one of the filter's directories.
    ///
    /// Containment is component-based (`src` contains `src/a.rs` but not
    /// `srcx/a.rs`). With no configured directories, any path under
    /// `base_dir` is in the tree.
    pub fn is_in_tree(&self, path: &Path, base_dir: &Path) -> bool {
        let abs = absolutize(path, base_dir);
        if self.directories.is_empty() {
            return abs.starts_with(base_dir);
        }
        self.directories
            .iter()
            .any(|dir| abs.starts_with(base_dir.join(dir)))
    }

    /// Whether `path` matches the filter (directory containment AND at
    /// least one pattern, with empty pattern list matching any name).
    pub fn matches(&self, path: &Path, base_dir: &Path) -> bool {
        if path.as_os_str().is_empty() || !self.is_in_tree(path, base_dir) {
            return false;
        }
        if self.file_patterns.is_empty() {
            return true;
        }
        // Patterns are written with `/` separators; normalize the
        // candidate so they also match Windows-style paths.
        let candidate = path.to_string_lossy().replace('\\', "/");
        self.file_patterns.iter().any(|pattern| {
            Regex::new(pattern)
                .map(|re| re.is_match(&candidate))
                .unwrap_or(false)
        })
    }

    /// Walk every configured directory under `base_dir` and collect all
    /// matching files.
    ///
    /// Unreachable directories are a partial failure: files found under the
    /// reachable ones are still returned, inside the error.
    pub fn find_all_matching_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>, FilterError> {
        let mut found = Vec::new();
        let mut unreachable = Vec::new();
        for dir in &self.directories {
            let root = base_dir.join(dir);
            if !root.is_dir() {
                unreachable.push(root);
                continue;
            }
            walk(&root, &mut |path| {
                if self.matches(path, base_dir) {
                    found.push(path.to_path_buf());
                }
            });
        }
        found.sort();
        if unreachable.is_empty() {
            Ok(found)
        } else {
            Err(FilterError::UnreachableDirectories { found, unreachable })
        }
    }
}

fn absolutize(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Depth-first walk calling `visit` on every file (never on directories).
/// Unreadable subtrees are logged and skipped.
pub(crate) fn walk(dir: &Path, visit: &mut impl FnMut(&Path)) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, visit);
        } else {
            visit(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn base() -> &'static Path {
        Path::new("/work/project")
    }

    #[test]
    fn empty_filter_matches_everything_under_base_dir() {
        let filter = FileTreeFilter::default();
        assert!(filter.matches(Path::new("/work/project/any/file.xyz"), base()));
        assert!(filter.matches(Path::new("deeply/nested/file"), base()));
        assert!(!filter.matches(Path::new("/elsewhere/file.rs"), base()));
    }

    #[test]
    fn directory_containment_is_component_based() {
        let filter = FileTreeFilter::new(["src"], Vec::<String>::new());
        assert!(filter.matches(Path::new("/work/project/src/main.rs"), base()));
        assert!(!filter.matches(Path::new("/work/project/srcx/main.rs"), base()));
        assert!(!filter.matches(Path::new("/work/project/tests/main.rs"), base()));
    }

    #[test]
    fn patterns_are_or_combined() {
        let filter = FileTreeFilter::new(["src"], [r"\.rs$", r"\.toml$"]);
        assert!(filter.matches(Path::new("src/lib.rs"), base()));
        assert!(filter.matches(Path::new("src/Cargo.toml"), base()));
        assert!(!filter.matches(Path::new("src/notes.txt"), base()));
    }

    #[test]
    fn slash_anchored_patterns_match_backslash_separated_paths() {
        let filter = FileTreeFilter::new(Vec::<String>::new(), [r"(^|/)test_.*\.py$"]);
        assert!(filter.matches(Path::new(r"tests\test_foo.py"), base()));
        assert!(!filter.matches(Path::new(r"tests\foo.py"), base()));
    }

    #[test]
    fn empty_path_never_matches() {
        let filter = FileTreeFilter::default();
        assert!(!filter.matches(Path::new(""), base()));
    }

    #[test]
    fn validate_rejects_malformed_pattern() {
        let filter = FileTreeFilter::new(["src"], ["("]);
        assert!(matches!(
            filter.validate(),
            Err(FilterError::InvalidPattern { .. })
        ));
        assert!(FileTreeFilter::new(["src"], [r"\.rs$"]).validate().is_ok());
    }

    #[test]
    fn find_all_matching_files_walks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/a.rs"), "").unwrap();
        fs::write(dir.path().join("src/nested/b.rs"), "").unwrap();
        fs::write(dir.path().join("src/readme.md"), "").unwrap();

        let filter = FileTreeFilter::new(["src"], [r"\.rs$"]);
        let files = filter.find_all_matching_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "rs"));
    }

    #[test]
    fn unreachable_directory_still_returns_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.rs"), "").unwrap();

        let filter = FileTreeFilter::new(["src", "missing"], [r"\.rs$"]);
        match filter.find_all_matching_files(dir.path()) {
            Err(FilterError::UnreachableDirectories { found, unreachable }) => {
                assert_eq!(found.len(), 1);
                assert_eq!(unreachable, vec![dir.path().join("missing")]);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }
}
