//! Platform-conditional command tables and the command runner.
//!
//! A toolchain ships a table of [`PlatformCommand`]s; the first entry whose
//! os/arch sets are empty (wildcard) or contain the running platform is the
//! one that gets executed. This replaces per-platform source files with a
//! runtime data table.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("command {path:?} could not be started: {source}")]
    NotRunnable {
        path: String,
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Platform identification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsName {
    Darwin,
    Linux,
    Windows,
}

impl OsName {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            OsName::Darwin
        } else if cfg!(target_os = "windows") {
            OsName::Windows
        } else {
            OsName::Linux
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchName {
    #[serde(rename = "386")]
    X86,
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl ArchName {
    pub fn current() -> Self {
        if cfg!(target_arch = "x86") {
            ArchName::X86
        } else if cfg!(target_arch = "aarch64") {
            ArchName::Arm64
        } else {
            ArchName::Amd64
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformCommand
// ---------------------------------------------------------------------------

/// A command restricted to a set of platforms. Empty os/arch sets act as
/// wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformCommand {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub os: Vec<OsName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<ArchName>,
    pub path: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl PlatformCommand {
    /// A command with no platform restriction.
    pub fn portable(path: impl Into<String>, arguments: &[&str]) -> Self {
        Self {
            os: Vec::new(),
            arch: Vec::new(),
            path: path.into(),
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn runs_on(&self, os: OsName, arch: ArchName) -> bool {
        (self.os.is_empty() || self.os.contains(&os))
            && (self.arch.is_empty() || self.arch.contains(&arch))
    }

    pub fn runs_here(&self) -> bool {
        self.runs_on(OsName::current(), ArchName::current())
    }

    /// The command formatted as a shell-style command line, for traces.
    pub fn command_line(&self) -> String {
        let mut line = self.path.clone();
        for arg in &self.arguments {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// First command in the table compatible with the given platform.
pub fn find_command(
    commands: &[PlatformCommand],
    os: OsName,
    arch: ArchName,
) -> Option<&PlatformCommand> {
    commands.iter().find(|c| c.runs_on(os, arch))
}

/// First command in the table compatible with the running platform.
pub fn find_compatible_command(commands: &[PlatformCommand]) -> Option<&PlatformCommand> {
    commands.iter().find(|c| c.runs_here())
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Outcome of a command that actually ran to completion.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    /// Combined stdout + stderr, always captured.
    pub output: String,
}

impl CommandResult {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.passed()
    }
}

/// Run `cmd` from `work_dir`, capturing combined output.
///
/// A spawn failure (missing binary, permission) is a [`CommandError`],
/// distinct from the command running and reporting a non-zero exit.
pub fn run_command(work_dir: &Path, cmd: &PlatformCommand) -> Result<CommandResult, CommandError> {
    info!(command = %cmd.command_line(), dir = %work_dir.display(), "running command");

    let output = Command::new(&cmd.path)
        .args(&cmd.arguments)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => CommandError::NotFound(cmd.path.clone()),
            _ => CommandError::NotRunnable {
                path: cmd.path.clone(),
                source,
            },
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    for line in combined.lines() {
        info!(target: "ratchet::command", "{line}");
    }

    Ok(CommandResult {
        exit_code: output.status.code(),
        output: combined,
    })
}

/// Resolve a command path the way the shell would.
///
/// Paths containing a separator are checked directly against the
/// filesystem; bare names are searched on `PATH`.
pub fn check_command_access(cmd_path: &str) -> Result<PathBuf, CommandError> {
    let path = Path::new(cmd_path);
    if path.components().count() > 1 || path.is_absolute() {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(CommandError::NotFound(cmd_path.to_string()));
    }

    let search = env::var_os("PATH").unwrap_or_default();
    for dir in env::split_paths(&search) {
        let candidate = dir.join(path);
        if candidate.is_file() {
            debug!(command = cmd_path, resolved = %candidate.display(), "command resolved");
            return Ok(candidate);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{cmd_path}.exe"));
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }
    Err(CommandError::NotFound(cmd_path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_command_runs_everywhere() {
        let cmd = PlatformCommand::portable("make", &["all"]);
        assert!(cmd.runs_on(OsName::Linux, ArchName::Amd64));
        assert!(cmd.runs_on(OsName::Windows, ArchName::Arm64));
        assert!(cmd.runs_here());
    }

    #[test]
    fn restricted_command_filters_on_os_and_arch() {
        let cmd = PlatformCommand {
            os: vec![OsName::Linux],
            arch: vec![ArchName::Amd64, ArchName::Arm64],
            path: "make".into(),
            arguments: vec![],
        };
        assert!(cmd.runs_on(OsName::Linux, ArchName::Amd64));
        assert!(!cmd.runs_on(OsName::Darwin, ArchName::Amd64));
        assert!(!cmd.runs_on(OsName::Linux, ArchName::X86));
    }

    #[test]
    fn find_command_picks_first_compatible_entry() {
        let commands = vec![
            PlatformCommand {
                os: vec![OsName::Windows],
                arch: vec![],
                path: "build.bat".into(),
                arguments: vec![],
            },
            PlatformCommand::portable("build.sh", &[]),
        ];
        let found = find_command(&commands, OsName::Linux, ArchName::Amd64).unwrap();
        assert_eq!(found.path, "build.sh");
        let found = find_command(&commands, OsName::Windows, ArchName::Amd64).unwrap();
        assert_eq!(found.path, "build.bat");
    }

    #[test]
    fn find_command_reports_inoperable_platform() {
        let commands = vec![PlatformCommand {
            os: vec![OsName::Windows],
            arch: vec![],
            path: "build.bat".into(),
            arguments: vec![],
        }];
        assert!(find_command(&commands, OsName::Linux, ArchName::Amd64).is_none());
    }

    #[test]
    fn command_line_formatting() {
        let cmd = PlatformCommand::portable("cargo", &["test", "--workspace"]);
        assert_eq!(cmd.command_line(), "cargo test --workspace");
    }

    #[test]
    fn missing_binary_is_not_found_not_a_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = PlatformCommand::portable("no-such-binary-ratchet", &[]);
        match run_command(dir.path(), &cmd) {
            Err(CommandError::NotFound(path)) => assert_eq!(path, "no-such-binary-ratchet"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = PlatformCommand::portable("sh", &["-c", "echo boom; exit 3"]);
        let result = run_command(dir.path(), &cmd).unwrap();
        assert!(result.failed());
        assert_eq!(result.exit_code, Some(3));
        assert!(result.output.contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn passing_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = PlatformCommand::portable("sh", &["-c", "echo ok"]);
        let result = run_command(dir.path(), &cmd).unwrap();
        assert!(result.passed());
        assert!(result.output.contains("ok"));
    }

    #[cfg(unix)]
    #[test]
    fn check_command_access_resolves_on_path() {
        assert!(check_command_access("sh").is_ok());
        assert!(matches!(
            check_command_access("no-such-binary-ratchet"),
            Err(CommandError::NotFound(_))
        ));
    }

    #[test]
    fn serde_uses_go_style_platform_names() {
        let cmd = PlatformCommand {
            os: vec![OsName::Darwin],
            arch: vec![ArchName::X86, ArchName::Amd64],
            path: "make".into(),
            arguments: vec![],
        };
        let toml = toml::to_string(&cmd).unwrap();
        assert!(toml.contains("darwin"));
        assert!(toml.contains("386"));
        assert!(toml.contains("amd64"));
        let back: PlatformCommand = toml::from_str(&toml).unwrap();
        assert_eq!(back, cmd);
    }
}
