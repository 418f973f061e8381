//! Resolved run parameters.
//!
//! `Params` is the already-resolved view of CLI flags, environment and
//! configuration. The engine consumes it as-is; no parsing happens here
//! beyond directory validation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a run needs, resolved upfront.
#[derive(Debug, Clone)]
pub struct Params {
    /// Root of the watched source tree.
    pub base_dir: PathBuf,
    /// Directory build/test commands are launched from.
    pub work_dir: PathBuf,
    /// Directory holding user language/toolchain descriptors.
    pub config_dir: PathBuf,
    /// Language name; empty means "detect from base dir name".
    pub language: String,
    /// Toolchain name; empty means "language default".
    pub toolchain: String,
    /// VCS backend name ("git" or "p4").
    pub vcs: String,
    /// Period of the synthetic polling trigger; zero disables polling.
    pub polling_period: Duration,
    /// Mob turn duration for the role-rotation reminder; zero disables it.
    pub mob_turn_duration: Duration,
    pub auto_push: bool,
    pub commit_failures: bool,
    /// Variant policy name ("relaxed", "btcr", "introspective").
    pub variant: String,
    /// Optional free-form paragraph appended to commit messages.
    pub message_suffix: String,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            work_dir: PathBuf::from("."),
            config_dir: PathBuf::from("."),
            language: String::new(),
            toolchain: String::new(),
            vcs: "git".into(),
            polling_period: Duration::ZERO,
            mob_turn_duration: Duration::from_secs(5 * 60),
            auto_push: false,
            commit_failures: false,
            variant: "relaxed".into(),
            message_suffix: String::new(),
        }
    }
}

/// Resolve `dir` to an absolute path, requiring it to be an existing
/// directory.
pub fn checked_dir(dir: &Path) -> io::Result<PathBuf> {
    let abs = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()?.join(dir)
    };
    let meta = std::fs::metadata(&abs).map_err(|e| {
        io::Error::new(e.kind(), format!("cannot access {}: {e}", abs.display()))
    })?;
    if !meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} exists but is not a directory", abs.display()),
        ));
    }
    Ok(abs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_relaxed_git_no_push() {
        let params = Params::default();
        assert_eq!(params.vcs, "git");
        assert_eq!(params.variant, "relaxed");
        assert!(!params.auto_push);
        assert!(!params.commit_failures);
        assert_eq!(params.polling_period, Duration::ZERO);
    }

    #[test]
    fn checked_dir_accepts_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let abs = checked_dir(dir.path()).unwrap();
        assert!(abs.is_absolute());
    }

    #[test]
    fn checked_dir_rejects_missing_and_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(checked_dir(&dir.path().join("missing")).is_err());

        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "").unwrap();
        assert!(checked_dir(&file).is_err());
    }
}
