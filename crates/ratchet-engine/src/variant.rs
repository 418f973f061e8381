//! TCR variant policy.
//!
//! The variant decides what happens to a failing change: `relaxed` reverts
//! it, `btcr` (strict) may first record it as a tagged failure commit when
//! commit-on-fail is enabled. The names come from the TCR variants
//! described by Thomas Deniffel.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("variant not supported: {0:?}")]
pub struct UnsupportedVariantError(pub String);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    #[default]
    Relaxed,
    Btcr,
    Introspective,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Relaxed => "relaxed",
            Variant::Btcr => "btcr",
            Variant::Introspective => "introspective",
        }
    }

    /// Whether failing changes may be committed (as tagged failure
    /// commits) instead of silently reverted.
    pub fn allows_commit_on_fail(&self) -> bool {
        matches!(self, Variant::Btcr)
    }
}

impl FromStr for Variant {
    type Err = UnsupportedVariantError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_lowercase().as_str() {
            "relaxed" => Ok(Variant::Relaxed),
            "btcr" => Ok(Variant::Btcr),
            "introspective" => Ok(Variant::Introspective),
            _ => Err(UnsupportedVariantError(name.to_string())),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
