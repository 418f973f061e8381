//! Git adapter: reads go native through libgit2 (shell-out fallback when
//! the `libgit2` feature is off), writes always shell out to `git`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::{parse_numstat, FileDiff, Result, Vcs, VcsError};

pub const NAME: &str = "git";

/// Alias used by default for the git remote repository.
pub const DEFAULT_REMOTE_NAME: &str = "origin";

const ROOT_BRANCHES: [&str; 2] = ["main", "master"];

pub struct GitVcs {
    root_dir: PathBuf,
    working_branch: String,
    remote_name: String,
    remote_enabled: bool,
    branch_exists_on_remote: bool,
    push_enabled: bool,
}

impl GitVcs {
    /// Build a git session for the repository containing `dir`, reading
    /// branch and remote state once.
    pub fn new(dir: &Path) -> Result<Self> {
        let root_dir = read_root_dir(dir)?;
        let working_branch = read_working_branch(&root_dir)?;
        let remote_enabled = read_has_remote(&root_dir, DEFAULT_REMOTE_NAME)?;
        let branch_exists_on_remote = remote_enabled
            && read_branch_on_remote(&root_dir, DEFAULT_REMOTE_NAME, &working_branch)?;

        debug!(
            root = %root_dir.display(),
            branch = working_branch,
            remote = remote_enabled,
            "git session ready"
        );
        Ok(Self {
            root_dir,
            working_branch,
            remote_name: DEFAULT_REMOTE_NAME.to_string(),
            remote_enabled,
            branch_exists_on_remote,
            push_enabled: false,
        })
    }

    /// Run git from the repository root, capturing combined output.
    /// Non-zero exit becomes a [`VcsError::Command`].
    fn run_git(&self, args: &[&str]) -> Result<String> {
        run_git_in(&self.root_dir, args)
    }

    /// Like [`Self::run_git`] but traces every output line, for commands
    /// run for their effect rather than their output.
    fn trace_git(&self, args: &[&str]) -> Result<()> {
        let output = self.run_git(args)?;
        for line in output.lines() {
            info!(target: "ratchet::vcs", "{line}");
        }
        Ok(())
    }

    fn nothing_to_commit(&self) -> bool {
        #[cfg(feature = "libgit2")]
        {
            if let Ok(clean) = crate::git2_read::is_clean(&self.root_dir) {
                return clean;
            }
        }
        self.run_git(&["status", "--porcelain"])
            .map(|out| out.trim().is_empty())
            .unwrap_or(false)
    }
}

impl Vcs for GitVcs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn session_summary(&self) -> String {
        format!("{} branch {:?}", NAME, self.working_branch)
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn working_branch(&self) -> &str {
        &self.working_branch
    }

    fn is_on_root_branch(&self) -> bool {
        ROOT_BRANCHES.contains(&self.working_branch.as_str())
    }

    fn remote_name(&self) -> &str {
        &self.remote_name
    }

    fn is_remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    fn check_remote_access(&self) -> bool {
        self.remote_enabled
            && self
                .run_git(&["ls-remote", "--exit-code", &self.remote_name, "HEAD"])
                .is_ok()
    }

    fn enable_push(&mut self, flag: bool) {
        self.push_enabled = flag;
    }

    fn is_push_enabled(&self) -> bool {
        self.push_enabled
    }

    fn add(&self) -> Result<()> {
        self.trace_git(&["add", "."])
    }

    fn commit(&self, amend: bool, messages: &[String]) -> Result<()> {
        let mut args = vec!["commit", "--no-gpg-sign"];
        if amend {
            args.push("--amend");
        }
        for message in messages {
            args.push("-m");
            args.push(message);
        }
        match self.trace_git(&args) {
            // A clean tree is not a failure: the cycle simply had nothing
            // left to record.
            Err(_) if self.nothing_to_commit() => Ok(()),
            other => other,
        }
    }

    fn revert_last_commit(&self) -> Result<()> {
        info!("reverting last commit");
        self.trace_git(&["revert", "--no-gpg-sign", "--no-edit", "HEAD"])
    }

    fn restore(&self, path: &Path) -> Result<()> {
        warn!(file = %path.display(), "reverting file");
        let path = path.to_string_lossy();
        self.trace_git(&["checkout", "HEAD", "--", path.as_ref()])
    }

    fn stash(&self, message: &str) -> Result<()> {
        info!("stashing changes");
        self.trace_git(&[
            "stash",
            "push",
            "--quiet",
            "--include-untracked",
            "--message",
            message,
        ])
    }

    fn unstash(&self, keep: bool) -> Result<()> {
        info!("applying stashed changes");
        let action = if keep { "apply" } else { "pop" };
        self.trace_git(&["stash", action, "--quiet"])
    }

    fn push(&mut self) -> Result<()> {
        if !self.remote_enabled {
            return Ok(());
        }
        info!(
            remote = self.remote_name,
            branch = self.working_branch,
            "pushing changes"
        );
        self.trace_git(&[
            "push",
            "--no-recurse-submodules",
            &self.remote_name,
            &self.working_branch,
        ])?;
        self.branch_exists_on_remote = true;
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        if !self.remote_enabled || !self.branch_exists_on_remote {
            info!(branch = self.working_branch, "working locally on branch");
            return Ok(());
        }
        info!(
            remote = self.remote_name,
            branch = self.working_branch,
            "pulling latest changes"
        );
        self.trace_git(&[
            "pull",
            "--no-recurse-submodules",
            &self.remote_name,
            &self.working_branch,
        ])
    }

    fn diff(&self) -> Result<Vec<FileDiff>> {
        let output = self.run_git(&[
            "diff",
            "--numstat",
            "--ignore-cr-at-eol",
            "--ignore-all-space",
            "--ignore-blank-lines",
            "HEAD",
        ])?;
        Ok(parse_numstat(&output, &self.root_dir))
    }
}

// ---------------------------------------------------------------------------
// Session-state reads (native when available, shell-out otherwise)
// ---------------------------------------------------------------------------

fn read_root_dir(dir: &Path) -> Result<PathBuf> {
    #[cfg(feature = "libgit2")]
    {
        crate::git2_read::root_dir(dir)
    }
    #[cfg(not(feature = "libgit2"))]
    {
        let output = run_git_in(dir, &["rev-parse", "--show-toplevel"]).map_err(|_| {
            VcsError::NotARepo {
                vcs: NAME,
                dir: dir.display().to_string(),
            }
        })?;
        Ok(PathBuf::from(output.trim()))
    }
}

fn read_working_branch(root_dir: &Path) -> Result<String> {
    #[cfg(feature = "libgit2")]
    {
        crate::git2_read::working_branch(root_dir)
    }
    #[cfg(not(feature = "libgit2"))]
    {
        let output = run_git_in(root_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = output.trim().to_string();
        if branch == "HEAD" {
            return Err(VcsError::Unrecoverable {
                vcs: NAME,
                message: "HEAD is detached".to_string(),
            });
        }
        Ok(branch)
    }
}

fn read_has_remote(root_dir: &Path, remote: &str) -> Result<bool> {
    #[cfg(feature = "libgit2")]
    {
        crate::git2_read::has_remote(root_dir, remote)
    }
    #[cfg(not(feature = "libgit2"))]
    {
        let output = run_git_in(root_dir, &["remote"])?;
        Ok(output.lines().any(|l| l.trim() == remote))
    }
}

fn read_branch_on_remote(root_dir: &Path, remote: &str, branch: &str) -> Result<bool> {
    #[cfg(feature = "libgit2")]
    {
        crate::git2_read::branch_on_remote(root_dir, remote, branch)
    }
    #[cfg(not(feature = "libgit2"))]
    {
        let output = run_git_in(root_dir, &["branch", "-r", "--format=%(refname:short)"])?;
        let wanted = format!("{remote}/{branch}");
        Ok(output.lines().any(|l| l.trim() == wanted))
    }
}

fn run_git_in(dir: &Path, args: &[&str]) -> Result<String> {
    debug!(target: "ratchet::vcs", ?args, "git");
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(VcsError::Io)?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.status.success() {
        Ok(combined)
    } else {
        Err(VcsError::Command {
            vcs: NAME,
            message: format!("git {}: {}", args.join(" "), combined.trim()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Initialize a git repository with one commit on branch `main`.
    fn init_repo() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        git(&root, &["init", "-b", "main"]);
        git(&root, &["config", "user.email", "tcr@example.com"]);
        git(&root, &["config", "user.name", "tcr"]);
        fs::write(root.join("hello.txt"), "hello\n").unwrap();
        git(&root, &["add", "."]);
        git(&root, &["commit", "--no-gpg-sign", "-m", "initial"]);
        (dir, root)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    #[test]
    fn session_state_is_read_at_construction() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();
        assert_eq!(vcs.name(), "git");
        assert_eq!(vcs.working_branch(), "main");
        assert!(vcs.is_on_root_branch());
        assert!(!vcs.is_remote_enabled());
        assert!(!vcs.is_push_enabled());
        assert_eq!(
            vcs.root_dir().canonicalize().unwrap(),
            root.canonicalize().unwrap()
        );
        assert_eq!(vcs.session_summary(), "git branch \"main\"");
    }

    #[test]
    fn non_repository_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitVcs::new(dir.path()).is_err());
    }

    #[test]
    fn feature_branch_is_not_root_branch() {
        let (_guard, root) = init_repo();
        git(&root, &["checkout", "-b", "feature/tcr"]);
        let vcs = GitVcs::new(&root).unwrap();
        assert_eq!(vcs.working_branch(), "feature/tcr");
        assert!(!vcs.is_on_root_branch());
    }

    #[test]
    fn commit_and_diff_round() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();

        fs::write(root.join("hello.txt"), "hello\nworld\n").unwrap();
        let diffs = vcs.diff().unwrap();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].path.ends_with("hello.txt"));
        assert_eq!(diffs[0].added_lines, 1);

        vcs.add().unwrap();
        vcs.commit(false, &["tests passing".to_string()]).unwrap();
        assert!(vcs.diff().unwrap().is_empty());
    }

    #[test]
    fn commit_on_clean_tree_is_not_an_error() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();
        vcs.add().unwrap();
        vcs.commit(false, &["nothing to do".to_string()]).unwrap();
    }

    #[test]
    fn amend_rewords_the_previous_commit() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();
        vcs.commit(true, &["reworded".to_string()]).unwrap();
        let output = run_git_in(&root, &["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(output.trim(), "reworded");
    }

    #[test]
    fn restore_discards_local_changes() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();

        fs::write(root.join("hello.txt"), "broken\n").unwrap();
        vcs.restore(Path::new("hello.txt")).unwrap();
        assert_eq!(fs::read_to_string(root.join("hello.txt")).unwrap(), "hello\n");
    }

    #[test]
    fn push_and_pull_are_noops_without_remote() {
        let (_guard, root) = init_repo();
        let mut vcs = GitVcs::new(&root).unwrap();
        vcs.enable_push(true);
        assert!(vcs.is_push_enabled());
        vcs.push().unwrap();
        vcs.pull().unwrap();
        assert!(!vcs.check_remote_access());
    }

    #[test]
    fn stash_and_unstash_round() {
        let (_guard, root) = init_repo();
        let vcs = GitVcs::new(&root).unwrap();

        fs::write(root.join("hello.txt"), "stash me\n").unwrap();
        vcs.stash("wip").unwrap();
        assert_eq!(fs::read_to_string(root.join("hello.txt")).unwrap(), "hello\n");
        vcs.unstash(false).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("hello.txt")).unwrap(),
            "stash me\n"
        );
    }
}
