//! Native git read queries via libgit2.
//!
//! Session-state discovery (root dir, branch, remotes) happens once per
//! run, but going native avoids parsing porcelain text. Write operations
//! always shell out; libgit2 is used only for reads.

use std::path::{Path, PathBuf};

use crate::VcsError;

impl From<git2::Error> for VcsError {
    fn from(e: git2::Error) -> Self {
        VcsError::Command {
            vcs: "git",
            message: e.message().to_string(),
        }
    }
}

fn open(dir: &Path) -> Result<git2::Repository, VcsError> {
    git2::Repository::discover(dir).map_err(|_| VcsError::NotARepo {
        vcs: "git",
        dir: dir.display().to_string(),
    })
}

/// Working-tree root of the repository containing `dir`.
pub(crate) fn root_dir(dir: &Path) -> Result<PathBuf, VcsError> {
    let repo = open(dir)?;
    repo.workdir()
        .map(Path::to_path_buf)
        .ok_or(VcsError::Unrecoverable {
            vcs: "git",
            message: "bare repository has no working tree".to_string(),
        })
}

/// Current branch name. A brand-new repository reports the branch HEAD
/// points at; a detached HEAD is unrecoverable for a TCR run.
pub(crate) fn working_branch(dir: &Path) -> Result<String, VcsError> {
    let repo = open(dir)?;
    let result = match repo.head() {
        Ok(head) if head.is_branch() => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
        Ok(_) => Err(VcsError::Unrecoverable {
            vcs: "git",
            message: "HEAD is detached".to_string(),
        }),
        // No commit yet: resolve the symbolic HEAD target instead.
        Err(_) => {
            let head_ref = repo.find_reference("HEAD")?;
            let target = head_ref
                .symbolic_target()
                .unwrap_or("refs/heads/main")
                .to_string();
            Ok(target
                .strip_prefix("refs/heads/")
                .unwrap_or(&target)
                .to_string())
        }
    };
    result
}

/// Whether the given remote is configured.
pub(crate) fn has_remote(dir: &Path, remote: &str) -> Result<bool, VcsError> {
    let repo = open(dir)?;
    let found = repo.find_remote(remote).is_ok();
    Ok(found)
}

/// Whether `branch` already exists on `remote`.
pub(crate) fn branch_on_remote(dir: &Path, remote: &str, branch: &str) -> Result<bool, VcsError> {
    let repo = open(dir)?;
    let name = format!("{remote}/{branch}");
    let found = repo.find_branch(&name, git2::BranchType::Remote).is_ok();
    Ok(found)
}

/// Whether the working tree has no local modifications.
pub(crate) fn is_clean(dir: &Path) -> Result<bool, VcsError> {
    let repo = open(dir)?;
    let mut opts = git2::StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses.is_empty())
}
