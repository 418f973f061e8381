//! Perforce adapter: a thin shell wrapper over `p4`.
//!
//! Perforce is centralized, so the remote is always considered enabled and
//! "push" has no separate meaning (submit already publishes). Stash-like
//! behavior goes through shelving.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::{FileDiff, Result, Vcs, VcsError};

pub const NAME: &str = "p4";

pub struct P4Vcs {
    root_dir: PathBuf,
    client_name: String,
    push_enabled: bool,
}

impl P4Vcs {
    /// Build a p4 session rooted at `dir`. The client name comes from
    /// `P4CLIENT`, falling back to the hostname-style default p4 uses.
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(VcsError::NotARepo {
                vcs: NAME,
                dir: dir.display().to_string(),
            });
        }
        let client_name = env::var("P4CLIENT").unwrap_or_default();
        debug!(root = %dir.display(), client = client_name, "p4 session ready");
        Ok(Self {
            root_dir: dir.to_path_buf(),
            client_name,
            push_enabled: false,
        })
    }

    fn run_p4(&self, args: &[&str]) -> Result<String> {
        debug!(target: "ratchet::vcs", ?args, "p4");
        let output = Command::new("p4")
            .args(args)
            .current_dir(&self.root_dir)
            .output()
            .map_err(VcsError::Io)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(combined)
        } else {
            Err(VcsError::Command {
                vcs: NAME,
                message: format!("p4 {}: {}", args.join(" "), combined.trim()),
            })
        }
    }

    fn trace_p4(&self, args: &[&str]) -> Result<()> {
        let output = self.run_p4(args)?;
        for line in output.lines() {
            info!(target: "ratchet::vcs", "{line}");
        }
        Ok(())
    }
}

impl Vcs for P4Vcs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn session_summary(&self) -> String {
        format!("{} client {:?}", NAME, self.client_name)
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn working_branch(&self) -> &str {
        &self.client_name
    }

    // Perforce workspaces have no branch notion comparable to git's root
    // branch; never warn about it.
    fn is_on_root_branch(&self) -> bool {
        false
    }

    fn remote_name(&self) -> &str {
        "perforce"
    }

    fn is_remote_enabled(&self) -> bool {
        true
    }

    fn check_remote_access(&self) -> bool {
        self.run_p4(&["info"]).is_ok()
    }

    fn enable_push(&mut self, flag: bool) {
        self.push_enabled = flag;
    }

    fn is_push_enabled(&self) -> bool {
        self.push_enabled
    }

    fn add(&self) -> Result<()> {
        self.trace_p4(&["reconcile", "-a", "-e", "-d", "..."])
    }

    fn commit(&self, amend: bool, messages: &[String]) -> Result<()> {
        if amend {
            // Submitted changelist descriptions cannot be rewritten here.
            warn!("p4 cannot amend a submitted change, skipping");
            return Ok(());
        }
        let description = messages.join("\n\n");
        self.trace_p4(&["submit", "-d", &description])
    }

    fn revert_last_commit(&self) -> Result<()> {
        // Submitted changelists are immutable; there is no p4 counterpart
        // to reverting the last commit.
        Err(VcsError::Command {
            vcs: NAME,
            message: "reverting a submitted changelist is not supported".to_string(),
        })
    }

    fn restore(&self, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        // p4 revert only acts on opened files; in an allwrite workspace
        // nothing ran `p4 edit`, so reconcile the path first.
        if let Err(e) = self.trace_p4(&["reconcile", path.as_ref()]) {
            warn!(error = %e, "p4 reconcile failed before revert");
        }
        self.trace_p4(&["revert", path.as_ref()])
    }

    fn stash(&self, _message: &str) -> Result<()> {
        self.trace_p4(&["shelve", "..."])
    }

    fn unstash(&self, keep: bool) -> Result<()> {
        self.trace_p4(&["unshelve", "..."])?;
        if !keep {
            self.trace_p4(&["shelve", "-d", "..."])?;
        }
        Ok(())
    }

    fn push(&mut self) -> Result<()> {
        // Submit already published the change.
        Ok(())
    }

    fn pull(&self) -> Result<()> {
        info!("syncing workspace");
        self.trace_p4(&["sync"])
    }

    fn diff(&self) -> Result<Vec<FileDiff>> {
        let output = self.run_p4(&["diff", "-sa"])?;
        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| FileDiff::new(line.trim(), 0, 0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_accessors_do_not_contact_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let mut vcs = P4Vcs::new(dir.path()).unwrap();
        assert_eq!(vcs.name(), "p4");
        assert!(vcs.is_remote_enabled());
        assert!(!vcs.is_on_root_branch());
        assert_eq!(vcs.root_dir(), dir.path());
        assert!(!vcs.is_push_enabled());
        vcs.enable_push(true);
        assert!(vcs.is_push_enabled());
        vcs.push().unwrap();
    }

    #[test]
    fn reverting_a_submitted_changelist_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = P4Vcs::new(dir.path()).unwrap();
        match vcs.revert_last_commit() {
            Err(VcsError::Command { vcs, .. }) => assert_eq!(vcs, "p4"),
            other => panic!("expected a command error, got {other:?}"),
        }
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(P4Vcs::new(&dir.path().join("missing")).is_err());
    }
}
