//! Language descriptors and the language registry.
//!
//! A language ties together a source filter, a test filter and the set of
//! toolchains it can run with. Languages are looked up by name, or detected
//! from the base directory's name when no name is given.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::filter::{FileTreeFilter, FilterError};

#[derive(Debug, thiserror::Error)]
pub enum LanguageError {
    #[error("invalid language: {0}")]
    Validation(String),

    #[error("language not supported: {0:?}")]
    NotFound(String),

    #[error("cannot detect language from directory name {0:?}")]
    DetectionFailed(String),

    #[error("toolchain {toolchain:?} is not compatible with language {language:?}")]
    IncompatibleToolchain { language: String, toolchain: String },

    #[error(transparent)]
    Filter(#[from] FilterError),
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Toolchain compatibility declaration for a language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchains {
    pub default: String,
    pub compatible: Vec<String>,
}

/// A language descriptor: filters plus compatible toolchains.
#[derive(Debug, Clone, PartialEq)]
pub struct Language {
    name: String,
    toolchains: Toolchains,
    src_filter: FileTreeFilter,
    test_filter: FileTreeFilter,
}

impl Language {
    pub fn new(
        name: impl Into<String>,
        toolchains: Toolchains,
        src_filter: FileTreeFilter,
        test_filter: FileTreeFilter,
    ) -> Self {
        Self {
            name: name.into(),
            toolchains,
            src_filter,
            test_filter,
        }
    }

    pub fn validate(&self) -> Result<(), LanguageError> {
        if self.name.is_empty() {
            return Err(LanguageError::Validation("language name is empty".into()));
        }
        if self.toolchains.compatible.is_empty() {
            return Err(LanguageError::Validation(format!(
                "language {:?} has no compatible toolchain",
                self.name
            )));
        }
        if self.toolchains.default.is_empty() {
            return Err(LanguageError::Validation(format!(
                "language {:?} has no default toolchain",
                self.name
            )));
        }
        if !self.is_compatible_with(&self.toolchains.default) {
            return Err(LanguageError::Validation(format!(
                "language {:?} default toolchain {:?} is not in its compatible list",
                self.name, self.toolchains.default
            )));
        }
        self.src_filter.validate()?;
        self.test_filter.validate()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn toolchains(&self) -> &Toolchains {
        &self.toolchains
    }

    pub fn src_file_filter(&self) -> &FileTreeFilter {
        &self.src_filter
    }

    pub fn test_file_filter(&self) -> &FileTreeFilter {
        &self.test_filter
    }

    fn is_compatible_with(&self, toolchain: &str) -> bool {
        self.toolchains
            .compatible
            .iter()
            .any(|t| t.eq_ignore_ascii_case(toolchain))
    }

    /// Resolve the toolchain name to use for this language: the default
    /// when `requested` is empty, otherwise `requested` if compatible.
    pub fn toolchain_name<'a>(&'a self, requested: &'a str) -> Result<&'a str, LanguageError> {
        if requested.is_empty() {
            return Ok(&self.toolchains.default);
        }
        if self.is_compatible_with(requested) {
            Ok(requested)
        } else {
            Err(LanguageError::IncompatibleToolchain {
                language: self.name.clone(),
                toolchain: requested.to_string(),
            })
        }
    }

    /// Union of source and test filter directories, joined to `base_dir`
    /// and deduplicated.
    pub fn dirs_to_watch(&self, base_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = BTreeSet::new();
        for dir in self
            .src_filter
            .directories
            .iter()
            .chain(&self.test_filter.directories)
        {
            dirs.insert(base_dir.join(dir));
        }
        dirs.into_iter().collect()
    }

    pub fn is_src_file(&self, path: &Path, base_dir: &Path) -> bool {
        self.src_filter.matches(path, base_dir)
    }

    pub fn is_test_file(&self, path: &Path, base_dir: &Path) -> bool {
        self.test_filter.matches(path, base_dir)
    }

    /// Whether the path belongs to the language at all (source or test).
    pub fn is_language_file(&self, path: &Path, base_dir: &Path) -> bool {
        self.is_src_file(path, base_dir) || self.is_test_file(path, base_dir)
    }

    pub fn all_src_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>, FilterError> {
        self.src_filter.find_all_matching_files(base_dir)
    }

    pub fn all_test_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>, FilterError> {
        self.test_filter.find_all_matching_files(base_dir)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Case-insensitive language table with a preserved built-in snapshot.
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    built_in: BTreeMap<String, Language>,
    registered: BTreeMap<String, Language>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_built_ins() -> Self {
        let mut registry = Self::default();
        for language in built_in_languages() {
            registry.add_built_in(language);
        }
        registry
    }

    fn add_built_in(&mut self, language: Language) {
        let key = language.name().to_lowercase();
        self.built_in.insert(key, language.clone());
        let _ = self.register(language);
    }

    /// Add or overwrite a language. Rejects invalid descriptors without
    /// touching the existing state.
    pub fn register(&mut self, language: Language) -> Result<(), LanguageError> {
        language.validate()?;
        debug!(language = language.name(), "registering language");
        self.registered
            .insert(language.name().to_lowercase(), language);
        Ok(())
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Result<&Language, LanguageError> {
        if name.is_empty() {
            return Err(LanguageError::NotFound(name.to_string()));
        }
        self.registered
            .get(&name.to_lowercase())
            .ok_or_else(|| LanguageError::NotFound(name.to_string()))
    }

    /// Resolve a language either by name, or, when the name is empty, from
    /// the last path segment of the base directory.
    pub fn get_or_detect(&self, name: &str, base_dir: &Path) -> Result<&Language, LanguageError> {
        if !name.is_empty() {
            return self.get(name);
        }
        self.detect(base_dir)
    }

    /// Derive the language from the base directory's name.
    pub fn detect(&self, base_dir: &Path) -> Result<&Language, LanguageError> {
        let dir_name = base_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.get(&dir_name)
            .map_err(|_| LanguageError::DetectionFailed(dir_name))
    }

    /// Registered names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        self.registered.values().map(|l| l.name().to_string()).collect()
    }

    /// Restore a language to its built-in definition, if it has one.
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

fn built_in_languages() -> Vec<Language> {
    vec![
        Language::new(
            "rust",
            Toolchains {
                default: "cargo".into(),
                compatible: vec!["cargo".into()],
            },
            FileTreeFilter::new(["src"], [r"\.rs$"]),
            FileTreeFilter::new(["tests", "benches"], [r"\.rs$"]),
        ),
        Language::new(
            "go",
            Toolchains {
                default: "gotestsum".into(),
                compatible: vec!["gotestsum".into()],
            },
            FileTreeFilter::new(["."], [r"\.go$"]),
            FileTreeFilter::new(["."], [r"_test\.go$"]),
        ),
        Language::new(
            "java",
            Toolchains {
                default: "gradle".into(),
                compatible: vec!["gradle".into(), "maven".into()],
            },
            FileTreeFilter::new(
                ["src/main/java", "src/main/resources"],
                [r"\.java$", r"\.properties$", r"\.xml$"],
            ),
            FileTreeFilter::new(
                ["src/test/java", "src/test/resources"],
                [r"\.java$", r"\.properties$", r"\.xml$"],
            ),
        ),
        Language::new(
            "python",
            Toolchains {
                default: "pytest".into(),
                compatible: vec!["pytest".into()],
            },
            FileTreeFilter::new(["src"], [r"\.py$"]),
            FileTreeFilter::new(["tests"], [r"(^|/)test_.*\.py$", r"_test\.py$"]),
        ),
    ]
}
