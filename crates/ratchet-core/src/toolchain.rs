//! Toolchain descriptors and the toolchain registry.
//!
//! A toolchain maps to build/test command tables parametrized by OS and
//! architecture. The registry is an explicit object (no process-wide
//! mutable table) so tests can run in isolation; built-in toolchains are
//! snapshotted so `reset` can restore them after user overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{
    check_command_access, find_command, find_compatible_command, run_command, ArchName,
    CommandError, CommandResult, OsName, PlatformCommand,
};

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("invalid toolchain: {0}")]
    Validation(String),

    #[error("toolchain not supported: {0:?}")]
    NotFound(String),

    #[error("toolchain {name:?} has no {kind} command for this platform")]
    NotSupportedHere { name: String, kind: &'static str },

    #[error(transparent)]
    Command(#[from] CommandError),
}

// ---------------------------------------------------------------------------
// Toolchain
// ---------------------------------------------------------------------------

/// A named build/test toolchain.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
    name: String,
    build_commands: Vec<PlatformCommand>,
    test_commands: Vec<PlatformCommand>,
    test_result_dir: String,
}

impl Toolchain {
    pub fn new(
        name: impl Into<String>,
        build_commands: Vec<PlatformCommand>,
        test_commands: Vec<PlatformCommand>,
        test_result_dir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            build_commands,
            test_commands,
            test_result_dir: test_result_dir.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ToolchainError> {
        if self.name.is_empty() {
            return Err(ToolchainError::Validation("toolchain name is empty".into()));
        }
        if self.build_commands.is_empty() {
            return Err(ToolchainError::Validation(format!(
                "toolchain {:?} has no build command",
                self.name
            )));
        }
        if self.test_commands.is_empty() {
            return Err(ToolchainError::Validation(format!(
                "toolchain {:?} has no test command",
                self.name
            )));
        }
        for cmd in self.build_commands.iter().chain(&self.test_commands) {
            if cmd.path.is_empty() {
                return Err(ToolchainError::Validation(format!(
                    "toolchain {:?} has a command with an empty path",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build_commands(&self) -> &[PlatformCommand] {
        &self.build_commands
    }

    pub fn test_commands(&self) -> &[PlatformCommand] {
        &self.test_commands
    }

    pub fn test_result_dir(&self) -> &str {
        &self.test_result_dir
    }

    /// Absolute path to the test result directory for a given work dir.
    pub fn test_result_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.test_result_dir)
    }

    /// The build command selected for the running platform. A toolchain
    /// with no compatible entry is inoperable here.
    pub fn build_command(&self) -> Result<&PlatformCommand, ToolchainError> {
        find_compatible_command(&self.build_commands).ok_or(ToolchainError::NotSupportedHere {
            name: self.name.clone(),
            kind: "build",
        })
    }

    /// The test command selected for the running platform.
    pub fn test_command(&self) -> Result<&PlatformCommand, ToolchainError> {
        find_compatible_command(&self.test_commands).ok_or(ToolchainError::NotSupportedHere {
            name: self.name.clone(),
            kind: "test",
        })
    }

    pub fn build_command_path(&self) -> Result<&str, ToolchainError> {
        Ok(&self.build_command()?.path)
    }

    pub fn test_command_path(&self) -> Result<&str, ToolchainError> {
        Ok(&self.test_command()?.path)
    }

    /// Whether both build and test commands exist for the given platform.
    pub fn runs_on(&self, os: OsName, arch: ArchName) -> bool {
        find_command(&self.build_commands, os, arch).is_some()
            && find_command(&self.test_commands, os, arch).is_some()
    }

    /// Verify that the platform-selected build and test executables can be
    /// located (PATH lookup or filesystem existence).
    pub fn check_commands_access(&self) -> Result<(), ToolchainError> {
        check_command_access(self.build_command_path()?)?;
        check_command_access(self.test_command_path()?)?;
        Ok(())
    }

    /// Run the build command from `work_dir`.
    pub fn run_build(&self, work_dir: &Path) -> Result<CommandResult, ToolchainError> {
        Ok(run_command(work_dir, self.build_command()?)?)
    }

    /// Run the test command from `work_dir`.
    pub fn run_tests(&self, work_dir: &Path) -> Result<CommandResult, ToolchainError> {
        Ok(run_command(work_dir, self.test_command()?)?)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Case-insensitive toolchain table with a preserved built-in snapshot.
#[derive(Debug, Default)]
pub struct ToolchainRegistry {
    built_in: BTreeMap<String, Toolchain>,
    registered: BTreeMap<String, Toolchain>,
}

impl ToolchainRegistry {
    /// An empty registry, for tests and programmatic setups.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in toolchains.
    pub fn with_built_ins() -> Self {
        let mut registry = Self::default();
        for toolchain in built_in_toolchains() {
            registry.add_built_in(toolchain);
        }
        registry
    }

    fn add_built_in(&mut self, toolchain: Toolchain) {
        let key = toolchain.name().to_lowercase();
        self.built_in.insert(key, toolchain.clone());
        // Built-ins validate by construction.
        let _ = self.register(toolchain);
    }

    /// Add or overwrite a toolchain. Rejects invalid descriptors without
    /// touching the existing state.
    pub fn register(&mut self, toolchain: Toolchain) -> Result<(), ToolchainError> {
        toolchain.validate()?;
        debug!(toolchain = toolchain.name(), "registering toolchain");
        self.registered
            .insert(toolchain.name().to_lowercase(), toolchain);
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Result<&Toolchain, ToolchainError> {
        if name.is_empty() {
            return Err(ToolchainError::NotFound(name.to_string()));
        }
        self.registered
            .get(&name.to_lowercase())
            .ok_or_else(|| ToolchainError::NotFound(name.to_string()))
    }

    /// Registered names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        self.registered.values().map(|t| t.name().to_string()).collect()
    }

    /// Restore a toolchain to its built-in definition, if it has one.
    pub fn reset(&mut self, name: &str) {
        let key = name.to_lowercase();
        if let Some(built_in) = self.built_in.get(&key).cloned() {
            self.registered.insert(key, built_in);
        }
    }

    pub fn unregister(&mut self, name: &str) {
        self.registered.remove(&name.to_lowercase());
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

fn built_in_toolchains() -> Vec<Toolchain> {
    vec![
        Toolchain::new(
            "cargo",
            vec![PlatformCommand::portable(
                "cargo",
                &["build", "--workspace"],
            )],
            vec![PlatformCommand::portable("cargo", &["test", "--workspace"])],
            "target/test-results",
        ),
        Toolchain::new(
            "gotestsum",
            vec![PlatformCommand::portable("go", &["build", "./..."])],
            vec![PlatformCommand::portable(
                "gotestsum",
                &["--format", "testname", "./..."],
            )],
            "_test_results",
        ),
        Toolchain::new(
            "gradle",
            vec![
                PlatformCommand {
                    os: vec![OsName::Windows],
                    arch: vec![],
                    path: "gradlew.bat".into(),
                    arguments: vec!["build".into(), "-x".into(), "test".into()],
                },
                PlatformCommand::portable("./gradlew", &["build", "-x", "test"]),
            ],
            vec![
                PlatformCommand {
                    os: vec![OsName::Windows],
                    arch: vec![],
                    path: "gradlew.bat".into(),
                    arguments: vec!["test".into()],
                },
                PlatformCommand::portable("./gradlew", &["test"]),
            ],
            "build/test-results/test",
        ),
        Toolchain::new(
            "maven",
            vec![
                PlatformCommand {
                    os: vec![OsName::Windows],
                    arch: vec![],
                    path: "mvnw.cmd".into(),
                    arguments: vec!["test-compile".into()],
                },
                PlatformCommand::portable("./mvnw", &["test-compile"]),
            ],
            vec![
                PlatformCommand {
                    os: vec![OsName::Windows],
                    arch: vec![],
                    path: "mvnw.cmd".into(),
                    arguments: vec!["test".into()],
                },
                PlatformCommand::portable("./mvnw", &["test"]),
            ],
            "target/surefire-reports",
        ),
        Toolchain::new(
            "pytest",
            vec![PlatformCommand::portable(
                "python",
                &["-m", "compileall", "-q", "."],
            )],
            vec![PlatformCommand::portable("python", &["-m", "pytest"])],
            ".pytest_results",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(name: &str) -> Toolchain {
        Toolchain::new(
            name,
            vec![PlatformCommand::portable("build-cmd", &[])],
            vec![PlatformCommand::portable("test-cmd", &[])],
            "results",
        )
    }

    #[test]
    fn built_ins_are_present_and_valid() {
        let registry = ToolchainRegistry::with_built_ins();
        for name in ["cargo", "gotestsum", "gradle", "maven", "pytest"] {
            let toolchain = registry.get(name).unwrap();
            toolchain.validate().unwrap();
        }
    }

    #[test]
    fn get_is_case_insensitive() {
        let registry = ToolchainRegistry::with_built_ins();
        assert_eq!(registry.get("CARGO").unwrap().name(), "cargo");
    }

    #[test]
    fn get_unknown_toolchain_fails() {
        let mut registry = ToolchainRegistry::empty();
        registry.register(dummy("gradle")).unwrap();
        registry.register(dummy("maven")).unwrap();
        assert!(matches!(
            registry.get("cmake"),
            Err(ToolchainError::NotFound(name)) if name == "cmake"
        ));
    }

    #[test]
    fn get_empty_name_fails() {
        let registry = ToolchainRegistry::with_built_ins();
        assert!(matches!(registry.get(""), Err(ToolchainError::NotFound(_))));
    }

    #[test]
    fn register_rejects_missing_commands() {
        let mut registry = ToolchainRegistry::empty();
        let no_build = Toolchain::new(
            "broken",
            vec![],
            vec![PlatformCommand::portable("t", &[])],
            "",
        );
        assert!(matches!(
            registry.register(no_build),
            Err(ToolchainError::Validation(_))
        ));
        let no_name = dummy("");
        assert!(registry.register(no_name).is_err());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn register_overwrites_and_reset_restores_built_in() {
        let mut registry = ToolchainRegistry::with_built_ins();
        let replacement = dummy("cargo");
        registry.register(replacement.clone()).unwrap();
        assert_eq!(registry.get("cargo").unwrap(), &replacement);

        registry.reset("cargo");
        assert_eq!(
            registry.get("cargo").unwrap().build_command_path().unwrap(),
            "cargo"
        );
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let mut registry = ToolchainRegistry::empty();
        registry.register(dummy("make")).unwrap();
        registry.register(dummy("make")).unwrap();
        assert_eq!(registry.names(), vec!["make".to_string()]);
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = ToolchainRegistry::empty();
        registry.register(dummy("zig")).unwrap();
        registry.register(dummy("ant")).unwrap();
        assert_eq!(registry.names(), vec!["ant".to_string(), "zig".to_string()]);
    }

    #[test]
    fn platform_selection_per_command_kind() {
        let registry = ToolchainRegistry::with_built_ins();
        let gradle = registry.get("gradle").unwrap();
        assert!(gradle.runs_on(OsName::Windows, ArchName::Amd64));
        assert!(gradle.runs_on(OsName::Linux, ArchName::Arm64));
        let build = find_command(gradle.build_commands(), OsName::Windows, ArchName::Amd64);
        assert_eq!(build.unwrap().path, "gradlew.bat");
    }

    #[test]
    fn inoperable_platform_is_an_error() {
        let windows_only = Toolchain::new(
            "msbuild",
            vec![PlatformCommand {
                os: vec![OsName::Windows],
                arch: vec![],
                path: "msbuild.exe".into(),
                arguments: vec![],
            }],
            vec![PlatformCommand {
                os: vec![OsName::Windows],
                arch: vec![],
                path: "vstest.exe".into(),
                arguments: vec![],
            }],
            "",
        );
        if OsName::current() != OsName::Windows {
            assert!(matches!(
                windows_only.build_command(),
                Err(ToolchainError::NotSupportedHere { kind: "build", .. })
            ));
        }
    }

    #[test]
    fn test_result_path_joins_work_dir() {
        let registry = ToolchainRegistry::with_built_ins();
        let maven = registry.get("maven").unwrap();
        assert_eq!(
            maven.test_result_path(Path::new("/work")),
            PathBuf::from("/work/target/surefire-reports")
        );
    }
}
