//! TOML persistence for language and toolchain descriptors.
//!
//! Users can extend or override the built-in registries by dropping
//! descriptor files under `<config_dir>/language/<name>.toml` and
//! `<config_dir>/toolchain/<name>.toml`. The descriptor name is the file
//! stem, never a field inside the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::PlatformCommand;
use crate::filter::FileTreeFilter;
use crate::language::{Language, LanguageRegistry, Toolchains};
use crate::toolchain::{Toolchain, ToolchainRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize descriptor {name:?}: {source}")]
    Serialize {
        name: String,
        #[source]
        source: toml::ser::Error,
    },
}

const LANGUAGE_DIR: &str = "language";
const TOOLCHAIN_DIR: &str = "toolchain";

// ---------------------------------------------------------------------------
// Language descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    #[serde(skip)]
    pub name: String,
    pub toolchains: LanguageToolchainsConfig,
    pub source_files: FileFilterConfig,
    pub test_files: FileFilterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageToolchainsConfig {
    pub default: String,
    #[serde(rename = "compatible-with")]
    pub compatible: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFilterConfig {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

pub fn as_language(cfg: LanguageConfig) -> Language {
    Language::new(
        cfg.name,
        Toolchains {
            default: cfg.toolchains.default,
            compatible: cfg.toolchains.compatible,
        },
        as_filter(cfg.source_files),
        as_filter(cfg.test_files),
    )
}

pub fn as_language_config(lang: &Language) -> LanguageConfig {
    LanguageConfig {
        name: lang.name().to_string(),
        toolchains: LanguageToolchainsConfig {
            default: lang.toolchains().default.clone(),
            compatible: lang.toolchains().compatible.clone(),
        },
        source_files: as_filter_config(lang.src_file_filter()),
        test_files: as_filter_config(lang.test_file_filter()),
    }
}

fn as_filter(cfg: FileFilterConfig) -> FileTreeFilter {
    FileTreeFilter {
        directories: cfg.directories,
        file_patterns: cfg.patterns,
    }
}

fn as_filter_config(filter: &FileTreeFilter) -> FileFilterConfig {
    FileFilterConfig {
        directories: filter.directories.clone(),
        patterns: filter.file_patterns.clone(),
    }
}

// ---------------------------------------------------------------------------
// Toolchain descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "build-command")]
    pub build_commands: Vec<PlatformCommand>,
    #[serde(rename = "test-command")]
    pub test_commands: Vec<PlatformCommand>,
    #[serde(rename = "test-result-dir", default)]
    pub test_result_dir: String,
}

pub fn as_toolchain(cfg: ToolchainConfig) -> Toolchain {
    Toolchain::new(
        cfg.name,
        cfg.build_commands,
        cfg.test_commands,
        cfg.test_result_dir,
    )
}

pub fn as_toolchain_config(toolchain: &Toolchain) -> ToolchainConfig {
    ToolchainConfig {
        name: toolchain.name().to_string(),
        build_commands: toolchain.build_commands().to_vec(),
        test_commands: toolchain.test_commands().to_vec(),
        test_result_dir: toolchain.test_result_dir().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Loading / saving
// ---------------------------------------------------------------------------

/// Load every descriptor under `config_dir` into the registries.
///
/// Invalid descriptors are logged and skipped; a missing config dir (or
/// missing subdirectory) simply loads nothing.
pub fn load_config_dir(
    config_dir: &Path,
    languages: &mut LanguageRegistry,
    toolchains: &mut ToolchainRegistry,
) {
    // Toolchains first: languages reference them by name.
    for (name, path) in descriptor_files(&config_dir.join(TOOLCHAIN_DIR)) {
        match read_descriptor::<ToolchainConfig>(&path, &name) {
            Ok(cfg) => {
                if let Err(e) = toolchains.register(as_toolchain(cfg)) {
                    warn!(file = %path.display(), error = %e, "skipping toolchain descriptor");
                }
            }
            Err(e) => warn!(error = %e, "skipping toolchain descriptor"),
        }
    }
    for (name, path) in descriptor_files(&config_dir.join(LANGUAGE_DIR)) {
        match read_descriptor::<LanguageConfig>(&path, &name) {
            Ok(cfg) => {
                if let Err(e) = languages.register(as_language(cfg)) {
                    warn!(file = %path.display(), error = %e, "skipping language descriptor");
                }
            }
            Err(e) => warn!(error = %e, "skipping language descriptor"),
        }
    }
}

/// Write every registered descriptor back under `config_dir`.
pub fn save_config_dir(
    config_dir: &Path,
    languages: &LanguageRegistry,
    toolchains: &ToolchainRegistry,
) -> Result<(), ConfigError> {
    let toolchain_dir = config_dir.join(TOOLCHAIN_DIR);
    ensure_dir(&toolchain_dir)?;
    for name in toolchains.names() {
        if let Ok(toolchain) = toolchains.get(&name) {
            write_descriptor(&toolchain_dir, &name, &as_toolchain_config(toolchain))?;
        }
    }

    let language_dir = config_dir.join(LANGUAGE_DIR);
    ensure_dir(&language_dir)?;
    for name in languages.names() {
        if let Ok(language) = languages.get(&name) {
            write_descriptor(&language_dir, &name, &as_language_config(language))?;
        }
    }
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

/// TOML files in `dir` as (file-stem, path) pairs, sorted by name.
fn descriptor_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "no descriptor directory");
        return Vec::new();
    };
    let mut files: Vec<(String, PathBuf)> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|p| {
            let stem = p.file_stem()?.to_string_lossy().into_owned();
            Some((stem, p))
        })
        .collect();
    files.sort();
    files
}

fn read_descriptor<T>(path: &Path, name: &str) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Named,
{
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: T = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.set_name(name);
    debug!(file = %path.display(), "loaded descriptor");
    Ok(cfg)
}

fn write_descriptor<T: Serialize>(dir: &Path, name: &str, cfg: &T) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(cfg).map_err(|source| ConfigError::Serialize {
        name: name.to_string(),
        source,
    })?;
    let path = dir.join(format!("{name}.toml"));
    fs::write(&path, text).map_err(|source| ConfigError::Io { path, source })
}

/// Descriptors carry their name outside the file (the file stem).
trait Named {
    fn set_name(&mut self, name: &str);
}

impl Named for LanguageConfig {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

impl Named for ToolchainConfig {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ArchName, OsName};

    fn sample_language() -> Language {
        Language::new(
            "kotlin",
            Toolchains {
                default: "gradle".into(),
                compatible: vec!["gradle".into(), "maven".into()],
            },
            FileTreeFilter::new(["src/main/kotlin"], [r"\.kt$"]),
            FileTreeFilter::new(["src/test/kotlin"], [r"\.kt$"]),
        )
    }

    fn sample_toolchain() -> Toolchain {
        Toolchain::new(
            "cmake",
            vec![PlatformCommand {
                os: vec![OsName::Linux, OsName::Darwin],
                arch: vec![ArchName::Amd64, ArchName::Arm64],
                path: "cmake".into(),
                arguments: vec!["--build".into(), "build".into()],
            }],
            vec![PlatformCommand::portable("ctest", &["--test-dir", "build"])],
            "build/test-results",
        )
    }

    #[test]
    fn language_round_trip_is_exact() {
        let original = sample_language();
        let back = as_language(as_language_config(&original));
        assert_eq!(back, original);
    }

    #[test]
    fn toolchain_round_trip_is_exact() {
        let original = sample_toolchain();
        let back = as_toolchain(as_toolchain_config(&original));
        assert_eq!(back, original);
    }

    #[test]
    fn language_round_trip_through_toml_text() {
        let cfg = as_language_config(&sample_language());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let mut parsed: LanguageConfig = toml::from_str(&text).unwrap();
        parsed.name = cfg.name.clone();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn save_then_load_registers_descriptors() {
        let config_dir = tempfile::tempdir().unwrap();

        let mut languages = LanguageRegistry::empty();
        let mut toolchains = ToolchainRegistry::empty();
        toolchains.register(sample_toolchain()).unwrap();
        toolchains
            .register(Toolchain::new(
                "gradle",
                vec![PlatformCommand::portable("./gradlew", &["build"])],
                vec![PlatformCommand::portable("./gradlew", &["test"])],
                "build/test-results",
            ))
            .unwrap();
        languages.register(sample_language()).unwrap();
        save_config_dir(config_dir.path(), &languages, &toolchains).unwrap();

        let mut loaded_languages = LanguageRegistry::empty();
        let mut loaded_toolchains = ToolchainRegistry::empty();
        load_config_dir(config_dir.path(), &mut loaded_languages, &mut loaded_toolchains);

        assert_eq!(loaded_languages.get("kotlin").unwrap(), &sample_language());
        assert_eq!(loaded_toolchains.get("cmake").unwrap(), &sample_toolchain());
        assert_eq!(loaded_toolchains.names().len(), 2);
    }

    #[test]
    fn invalid_descriptor_is_skipped_not_fatal() {
        let config_dir = tempfile::tempdir().unwrap();
        let lang_dir = config_dir.path().join("language");
        fs::create_dir_all(&lang_dir).unwrap();
        fs::write(lang_dir.join("broken.toml"), "not valid toml [").unwrap();

        let mut languages = LanguageRegistry::empty();
        let mut toolchains = ToolchainRegistry::empty();
        load_config_dir(config_dir.path(), &mut languages, &mut toolchains);
        assert!(languages.names().is_empty());
    }

    #[test]
    fn missing_config_dir_loads_nothing() {
        let mut languages = LanguageRegistry::empty();
        let mut toolchains = ToolchainRegistry::empty();
        load_config_dir(Path::new("/nonexistent/ratchet"), &mut languages, &mut toolchains);
        assert!(languages.names().is_empty());
        assert!(toolchains.names().is_empty());
    }
}
