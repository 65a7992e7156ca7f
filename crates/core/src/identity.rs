//! Library identities.
//!
//! A resolved node in a restore graph is identified by (name, version, kind).
//! Package names are case-insensitive everywhere: `Newtonsoft.Json` and
//! `newtonsoft.json` are the same library.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// What a resolved library is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// A package from a package source.
    Package,
    /// A project reference resolved in place.
    Project,
    /// A name no source could satisfy within its range.
    Unresolved,
}

/// The exact identity of a resolved library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIdentity {
    /// Library name; compared case-insensitively.
    pub name: String,
    /// Resolved version.
    pub version: Version,
    /// Package, project or unresolved.
    pub kind: LibraryKind,
}

impl LibraryIdentity {
    /// Create a package identity.
    #[must_use]
    pub fn package(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            kind: LibraryKind::Package,
        }
    }

    /// Create a project identity.
    #[must_use]
    pub fn project(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            kind: LibraryKind::Project,
        }
    }

    /// Create an unresolved placeholder identity.
    #[must_use]
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Version::new(0, 0, 0),
            kind: LibraryKind::Unresolved,
        }
    }

    /// Lowercased name, the canonical comparison and storage key.
    #[must_use]
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Case-insensitive name comparison.
    #[must_use]
    pub fn name_eq(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for LibraryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.version == other.version
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for LibraryIdentity {}

impl Hash for LibraryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
        self.version.hash(state);
        self.kind.hash(state);
    }
}

impl Ord for LibraryIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .to_lowercase()
            .cmp(&other.name.to_lowercase())
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for LibraryIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_name_comparison_is_case_insensitive() {
        let a = LibraryIdentity::package("Newtonsoft.Json", Version::new(13, 0, 1));
        let b = LibraryIdentity::package("newtonsoft.json", Version::new(13, 0, 1));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_kind_distinguishes_identities() {
        let pkg = LibraryIdentity::package("lib", Version::new(1, 0, 0));
        let proj = LibraryIdentity::project("lib", Version::new(1, 0, 0));
        assert_ne!(pkg, proj);
    }

    #[test]
    fn test_ordering_by_name_then_version() {
        let mut ids = vec![
            LibraryIdentity::package("zeta", Version::new(1, 0, 0)),
            LibraryIdentity::package("Alpha", Version::new(2, 0, 0)),
            LibraryIdentity::package("alpha", Version::new(1, 0, 0)),
        ];
        ids.sort();
        assert_eq!(ids[0].version, Version::new(1, 0, 0));
        assert!(ids[0].name_eq("alpha"));
        assert!(ids[2].name_eq("zeta"));
    }
}
