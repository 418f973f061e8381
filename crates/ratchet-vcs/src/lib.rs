//! VCS capability layer: the [`Vcs`] trait plus git and p4 adapters.
//!
//! The engine only ever talks to the trait. Session state (root dir,
//! working branch, remote flags) is read once when the adapter is built and
//! treated as immutable for the rest of the run, except for the
//! push-related flags the adapter itself maintains.

use std::path::{Path, PathBuf};

pub mod factory;
pub mod git;
pub mod p4;

#[cfg(feature = "libgit2")]
mod git2_read;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("{vcs} command failed: {message}")]
    Command { vcs: &'static str, message: String },

    #[error("not a {vcs} repository: {dir}")]
    NotARepo { vcs: &'static str, dir: String },

    #[error("VCS not supported: {0:?}")]
    Unsupported(String),

    /// Repository is in a state the engine cannot recover from (detached
    /// HEAD, corrupted index). Forces the control loop to stop.
    #[error("unrecoverable {vcs} repository state: {message}")]
    Unrecoverable { vcs: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, VcsError::Unrecoverable { .. })
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;

// ---------------------------------------------------------------------------
// File diffs
// ---------------------------------------------------------------------------

/// One file modified since the last commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub added_lines: usize,
    pub removed_lines: usize,
}

impl FileDiff {
    pub fn new(path: impl Into<PathBuf>, added_lines: usize, removed_lines: usize) -> Self {
        Self {
            path: path.into(),
            added_lines,
            removed_lines,
        }
    }
}

/// Parse `git diff --numstat` output. Paths are joined to `root_dir`;
/// binary-file entries (`-` counts) parse as zero.
pub fn parse_numstat(output: &str, root_dir: &Path) -> Vec<FileDiff> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let added = fields.next()?.parse().unwrap_or(0);
            let removed = fields.next()?.parse().unwrap_or(0);
            let path = fields.next()?;
            Some(FileDiff::new(root_dir.join(path), added, removed))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// The capability trait
// ---------------------------------------------------------------------------

/// Commit-on-success / revert-on-failure operations plus remote sync and
/// session capability queries.
pub trait Vcs: Send {
    fn name(&self) -> &'static str;

    /// Short human description of the session ("git branch \"main\"").
    fn session_summary(&self) -> String;

    fn root_dir(&self) -> &Path;
    fn working_branch(&self) -> &str;
    fn is_on_root_branch(&self) -> bool;
    fn remote_name(&self) -> &str;
    fn is_remote_enabled(&self) -> bool;
    fn check_remote_access(&self) -> bool;

    fn enable_push(&mut self, flag: bool);
    fn is_push_enabled(&self) -> bool;

    /// Stage all current changes.
    fn add(&self) -> Result<()>;

    /// Commit staged changes, or reword the previous commit when `amend`
    /// is set. Each message becomes its own paragraph. Committing a clean
    /// tree is not an error.
    fn commit(&self, amend: bool, messages: &[String]) -> Result<()>;

    /// Record a revert of the last commit as a new commit (history is
    /// preserved, the working tree goes back one step).
    fn revert_last_commit(&self) -> Result<()>;

    /// Restore a single path to its last committed state.
    fn restore(&self, path: &Path) -> Result<()>;

    fn stash(&self, message: &str) -> Result<()>;

    /// Re-apply the most recent stash; `keep` leaves it on the stash list.
    fn unstash(&self, keep: bool) -> Result<()>;

    /// Push the working branch. A no-op when the remote is disabled or
    /// auto-push is off.
    fn push(&mut self) -> Result<()>;

    /// Pull the working branch. A no-op when there is nothing to pull from.
    fn pull(&self) -> Result<()>;

    /// Files modified since the last commit.
    fn diff(&self) -> Result<Vec<FileDiff>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numstat_splits_fields_and_joins_root() {
        let output = "10\t2\tsrc/main.rs\n5\t0\tsrc/lib.rs\n";
        let diffs = parse_numstat(output, Path::new("/repo"));
        assert_eq!(
            diffs,
            vec![
                FileDiff::new("/repo/src/main.rs", 10, 2),
                FileDiff::new("/repo/src/lib.rs", 5, 0),
            ]
        );
    }

    #[test]
    fn parse_numstat_tolerates_binary_entries_and_noise() {
        let output = "-\t-\tassets/logo.png\nnot a numstat line\n";
        let diffs = parse_numstat(output, Path::new("/repo"));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].added_lines, 0);
        assert_eq!(diffs[0].removed_lines, 0);
    }

    #[test]
    fn parse_numstat_empty() {
        assert!(parse_numstat("", Path::new("/repo")).is_empty());
        assert!(parse_numstat("\n", Path::new("/repo")).is_empty());
    }

    #[test]
    fn unrecoverable_classification() {
        let err = VcsError::Unrecoverable {
            vcs: "git",
            message: "detached HEAD".into(),
        };
        assert!(err.is_unrecoverable());
        let err = VcsError::Command {
            vcs: "git",
            message: "push rejected".into(),
        };
        assert!(!err.is_unrecoverable());
    }
}
