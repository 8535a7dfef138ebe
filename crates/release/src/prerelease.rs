//! Prerelease and suffix tokens.
//!
//! A token turns a release into a prerelease. With a name every changed
//! package gets `-<name>` appended to its computed version. With a suffix
//! every published package (changed or not) gets `-<suffix>` appended to its
//! current version and dependents pin the suffixed version.

use crate::error::{Error, Result};

/// A prerelease name or version suffix applied to a whole release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrereleaseToken {
    name: Option<String>,
    suffix: Option<String>,
    partial: bool,
}

impl PrereleaseToken {
    /// Creates a token. Empty strings count as absent.
    ///
    /// `partial` only has effect together with a prerelease name: packages
    /// whose change is a hotfix or smaller keep their version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if both a name and a suffix are given.
    pub fn new(name: Option<String>, suffix: Option<String>, partial: bool) -> Result<Self> {
        let name = name.filter(|n| !n.is_empty());
        let suffix = suffix.filter(|s| !s.is_empty());
        if name.is_some() && suffix.is_some() {
            return Err(Error::config(
                "Prerelease name and suffix cannot be provided at the same time",
                "Pass either --prerelease-name or --suffix",
            ));
        }
        Ok(Self {
            name,
            suffix,
            partial,
        })
    }

    /// A token with no effect.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A prerelease-name token.
    #[must_use]
    pub fn prerelease(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()).filter(|n| !n.is_empty()),
            ..Self::default()
        }
    }

    /// A suffix token.
    #[must_use]
    pub fn suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: Some(suffix.into()).filter(|s| !s.is_empty()),
            ..Self::default()
        }
    }

    /// Marks the token as partial.
    #[must_use]
    pub const fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Whether the token changes anything.
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.name.is_some() || self.suffix.is_some()
    }

    /// Whether this is a prerelease-name token.
    #[must_use]
    pub const fn is_prerelease(&self) -> bool {
        self.name.is_some()
    }

    /// Whether this is a suffix token.
    #[must_use]
    pub const fn is_suffix(&self) -> bool {
        self.suffix.is_some()
    }

    /// Whether this is a partial prerelease.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial && self.is_prerelease()
    }

    /// The name or suffix, whichever is set.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.name.as_deref().or(self.suffix.as_deref())
    }
}
