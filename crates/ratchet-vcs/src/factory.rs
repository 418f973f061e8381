//! Name-based VCS adapter selection.

use std::path::Path;

use crate::git::GitVcs;
use crate::p4::P4Vcs;
use crate::{Result, Vcs, VcsError};

/// Build the adapter named by `name` ("git" or "p4", case-insensitive)
/// for the tree rooted at `base_dir`. Unknown names are a configuration
/// error.
pub fn init_vcs(name: &str, base_dir: &Path) -> Result<Box<dyn Vcs>> {
    match name.to_lowercase().as_str() {
        crate::git::NAME => Ok(Box::new(GitVcs::new(base_dir)?)),
        crate::p4::NAME => Ok(Box::new(P4Vcs::new(base_dir)?)),
        _ => Err(VcsError::Unsupported(name.to_string())),
    }
}
